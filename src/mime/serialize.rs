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

//! Writing parts and multipart bodies back to their wire form.
//!
//! Output always uses CRLF line endings.

use std::io::Write;

use super::header::encode_text;
use super::part::{Body, RawPart};
use crate::support::error::Error;

/// Return the delimiter for `boundary`, i.e., `boundary` prefixed with `--`.
pub fn delimiter(boundary: &str) -> Vec<u8> {
    let mut delimiter = Vec::with_capacity(boundary.len() + 2);
    delimiter.extend_from_slice(b"--");
    encode_text(boundary, &mut delimiter);
    delimiter
}

/// Write a multipart body made of `parts`.
///
/// If `parts` is empty and `allow_empty` is false, fails with
/// `EmptyMultipartNotAllowed` without writing anything.
pub fn write_multipart(
    out: &mut impl Write,
    boundary: &str,
    preamble: Option<&[u8]>,
    parts: &mut [RawPart],
    allow_empty: bool,
) -> Result<(), Error> {
    if parts.is_empty() && !allow_empty {
        return Err(Error::EmptyMultipartNotAllowed);
    }

    let delimiter = delimiter(boundary);

    if let Some(preamble) = preamble {
        out.write_all(preamble)?;
        out.write_all(b"\r\n")?;
    }

    for part in parts {
        out.write_all(&delimiter)?;
        out.write_all(b"\r\n")?;
        write_part(&mut *out, part)?;
        out.write_all(b"\r\n")?;
    }

    out.write_all(&delimiter)?;
    out.write_all(b"--\r\n")?;
    Ok(())
}

/// Write one part: its headers, a blank line, then its body.
///
/// A multipart body that has not been scanned yet is scanned first.
pub fn write_part(
    out: &mut impl Write,
    part: &mut RawPart,
) -> Result<(), Error> {
    part.headers().serialize(&mut *out, &[])?;
    out.write_all(b"\r\n")?;

    match *part.body_mut() {
        Body::Bytes(ref data) => out.write_all(data)?,
        Body::Multipart(ref mut multipart) => multipart.write_to(out)?,
    }

    Ok(())
}
