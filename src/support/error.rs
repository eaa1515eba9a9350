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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The multipart structure cannot be interpreted at all, for example
    /// because the content type lacks a boundary parameter and that is not
    /// being tolerated.
    #[error("Malformed multipart structure: {0}")]
    MalformedStructure(String),
    /// The stream ended before the final boundary.
    #[error("Missing multipart end boundary")]
    IncompleteMultipart,
    #[error("Multipart content with no body parts is not allowed")]
    EmptyMultipartNotAllowed,
    #[error("Header cannot have more than one value: {0}")]
    DuplicateHeader(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
