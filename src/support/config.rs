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

use serde::{Deserialize, Serialize};

/// The configuration file for the `mimestruct` tool.
///
/// Library users normally construct a `MultipartConfig` directly instead.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SystemConfig {
    /// Tolerances applied when decomposing multipart bodies.
    #[serde(default)]
    pub multipart: MultipartConfig,
}

/// Switches controlling how strictly multipart content is parsed and
/// written.
///
/// The defaults are tuned to accept the malformed mail commonly seen in the
/// wild while still refusing to write out a multipart with no parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MultipartConfig {
    /// If true, a stream which ends without the final `--boundary--` line is
    /// accepted and the multipart is flagged as incomplete. If false, this is
    /// an error.
    pub ignore_missing_end_boundary: bool,

    /// If true, a multipart content type without a `boundary` parameter is
    /// parsed by guessing the boundary from the first line starting with
    /// `--`. If false, such content is rejected.
    pub ignore_missing_boundary_parameter: bool,

    /// If true, any declared `boundary` parameter is disregarded and the
    /// boundary is always guessed from the content.
    ///
    /// This takes precedence over `ignore_missing_boundary_parameter`.
    pub ignore_existing_boundary_parameter: bool,

    /// If true, a multipart with no parts at all is acceptable, both when
    /// parsing and when writing.
    pub allow_empty_multipart: bool,

    /// If true, header lines are decoded as UTF-8 rather than one character
    /// per byte.
    pub allow_utf8_headers: bool,

    /// Multiparts nested deeper than this are left as raw bytes.
    pub max_nesting_depth: u32,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        MultipartConfig {
            ignore_missing_end_boundary: true,
            ignore_missing_boundary_parameter: true,
            ignore_existing_boundary_parameter: false,
            allow_empty_multipart: false,
            allow_utf8_headers: false,
            max_nesting_depth: 20,
        }
    }
}
