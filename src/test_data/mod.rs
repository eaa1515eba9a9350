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

/// A message with a preamble, trace headers, a folded `Content-Type`, and a
/// `multipart/alternative` nested inside a `multipart/mixed`.
///
/// Written exactly the way the serialiser writes it, so it must survive a
/// parse/write cycle byte-for-byte. In particular, there is a blank line
/// between the inner final boundary and the next outer boundary: the writer
/// always emits a line ending after a part, and the line ending after the
/// inner `--inner--` belongs to the outer boundary line.
pub static NESTED: &[u8] = include_bytes!("nested.eml");

/// A multipart whose input stops in the middle of its second part, without a
/// final boundary.
pub static TRUNCATED: &[u8] = include_bytes!("truncated.eml");

/// A `multipart/related` with no `boundary` parameter. The boundary has to be
/// guessed from the content, which also has a preamble containing a blank
/// line.
pub static UNDECLARED_BOUNDARY: &[u8] =
    include_bytes!("undeclared-boundary.eml");
