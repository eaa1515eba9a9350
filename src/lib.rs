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

//! Byte-exact parsing and writing of RFC 822 header blocks and MIME
//! multipart bodies.
//!
//! Headers live in a `HeaderStore` (`mime::header`). A whole message or body
//! part is a `RawPart` (`mime::part`); a multipart body is a
//! `MultipartEntity` (`mime::multipart`), which is only scanned once
//! something needs its structure.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod mime;
pub mod support;

#[cfg(test)]
mod test_data;

pub use crate::mime::header::HeaderStore;
pub use crate::mime::multipart::MultipartEntity;
pub use crate::mime::part::{Body, RawPart};
pub use crate::support::config::MultipartConfig;
pub use crate::support::error::Error;
