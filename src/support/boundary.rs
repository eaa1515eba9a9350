//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mimestruct.
//
// Mimestruct is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mimestruct is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Mimestruct. If not, see <http://www.gnu.org/licenses/>.

use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out multipart boundary tokens.
///
/// Each token combines a sequence number, a random component and the current
/// time, so tokens from one generator never repeat and tokens from different
/// processes are vanishingly unlikely to collide.
#[derive(Debug, Default)]
pub struct BoundaryGenerator {
    next: AtomicU32,
}

static GLOBAL: BoundaryGenerator = BoundaryGenerator::new();

impl BoundaryGenerator {
    pub const fn new() -> Self {
        BoundaryGenerator {
            next: AtomicU32::new(0),
        }
    }

    /// The process-wide generator, for callers that have no reason to keep
    /// their own.
    pub fn global() -> &'static BoundaryGenerator {
        &GLOBAL
    }

    /// Produce a new boundary token, without the leading `--`.
    pub fn generate(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!(
            "----=_Part_{}_{}.{}",
            seq,
            rand::random::<u32>(),
            chrono::Utc::now().timestamp_millis()
        )
    }
}
