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

//! Decomposition of a multipart body into its preamble and parts.

use std::io::{self, BufRead};

use log::{debug, warn};

use super::content_type::ContentType;
use super::part::RawPart;
use super::scanner::{BoundaryScanner, ScanState};
use super::serialize::delimiter;
use crate::support::config::MultipartConfig;
use crate::support::error::Error;
use crate::support::lookahead::Lookahead;

/// The first delimiter line of a multipart body and what came before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirstBoundary {
    /// The delimiter, including the leading `--`.
    pub delimiter: Vec<u8>,
    /// The lines before the delimiter, joined with CRLF, or `None` if there
    /// were no such lines.
    pub preamble: Option<Vec<u8>>,
}

/// The result of fully scanning a multipart body.
#[derive(Debug)]
pub struct ParsedMultipart {
    /// The boundary actually used, without the leading `--`.
    ///
    /// This is only `None` if no boundary was declared and none could be
    /// found.
    pub boundary: Option<String>,
    pub preamble: Option<Vec<u8>>,
    pub parts: Vec<RawPart>,
    /// Whether the body ended with a proper final boundary.
    pub complete: bool,
}

/// Splits a multipart body into parts according to a `MultipartConfig`.
#[derive(Debug)]
pub struct MultipartParser<'a> {
    config: &'a MultipartConfig,
    depth: u32,
}

impl<'a> MultipartParser<'a> {
    /// Create a parser for a multipart body nested `depth` levels deep.
    pub fn new(config: &'a MultipartConfig, depth: u32) -> Self {
        MultipartParser { config, depth }
    }

    /// Parse the whole body read from `source`, which is described by
    /// `content_type`.
    pub fn parse(
        &self,
        content_type: &ContentType,
        source: impl BufRead,
    ) -> Result<ParsedMultipart, Error> {
        let declared = content_type.parm("boundary");
        if declared.is_none() {
            if !self.config.ignore_missing_boundary_parameter {
                return Err(Error::MalformedStructure(format!(
                    "multipart/{} content type has no boundary parameter",
                    content_type.subtype
                )));
            }

            warn!(
                "multipart/{} has no boundary parameter, guessing boundary",
                content_type.subtype
            );
        }

        let mut source = Lookahead::new(source);
        let first = find_first_boundary(
            &mut source,
            declared,
            self.config.ignore_existing_boundary_parameter,
        )?;

        let first = match first {
            Some(first) => first,
            None if self.config.allow_empty_multipart => {
                warn!(
                    "No boundary found in multipart/{}, accepting as empty",
                    content_type.subtype
                );
                return Ok(ParsedMultipart {
                    boundary: declared.map(str::to_owned),
                    preamble: None,
                    parts: vec![],
                    complete: true,
                });
            }
            None => return Err(Error::EmptyMultipartNotAllowed),
        };

        let boundary = first.delimiter[2..]
            .iter()
            .copied()
            .map(char::from)
            .collect::<String>();
        if declared != Some(boundary.as_str()) {
            debug!("Using boundary {:?} found in content", boundary);
        }

        let mut parts = Vec::new();
        let complete = loop {
            let mut scanner =
                BoundaryScanner::new(&mut source, &first.delimiter);
            parts.push(RawPart::parse_nested(
                &mut scanner,
                self.config,
                self.depth + 1,
            )?);

            match scanner.state() {
                ScanState::Boundary => continue,
                ScanState::FinalBoundary => break true,
                ScanState::EndOfStream | ScanState::Content => {
                    if !self.config.ignore_missing_end_boundary {
                        return Err(Error::IncompleteMultipart);
                    }

                    warn!(
                        "multipart/{} ended after {} part(s) without \
                         final boundary",
                        content_type.subtype,
                        parts.len()
                    );
                    break false;
                }
            }
        };

        Ok(ParsedMultipart {
            boundary: Some(boundary),
            preamble: first.preamble,
            parts,
            complete,
        })
    }
}

/// Read whole lines from `source` until one is a multipart delimiter line.
///
/// If `declared` is given and `ignore_declared` is false, only that boundary
/// is accepted, optionally followed by whitespace. Otherwise, the first line
/// starting with `--` is taken to be the delimiter, minus any trailing
/// whitespace.
///
/// Returns `None` if the stream ends without any delimiter line. On success,
/// `source` is positioned at the start of the first part.
pub fn find_first_boundary<R: BufRead>(
    source: &mut Lookahead<R>,
    declared: Option<&str>,
    ignore_declared: bool,
) -> io::Result<Option<FirstBoundary>> {
    let declared = declared.filter(|_| !ignore_declared).map(delimiter);
    let mut preamble: Option<Vec<u8>> = None;

    while let Some(line) = source.read_line()? {
        let found = match declared {
            Some(ref declared) => {
                if is_delimiter_line(&line, declared) {
                    Some(declared.clone())
                } else {
                    None
                }
            }
            None => {
                let stripped = strip_trailing_lwsp(&line);
                if stripped.len() > 2 && stripped.starts_with(b"--") {
                    Some(stripped.to_vec())
                } else {
                    None
                }
            }
        };

        if let Some(delimiter) = found {
            return Ok(Some(FirstBoundary {
                delimiter,
                preamble,
            }));
        }

        match preamble {
            None => preamble = Some(line),
            Some(ref mut preamble) => {
                preamble.extend_from_slice(b"\r\n");
                preamble.extend_from_slice(&line);
            }
        }
    }

    Ok(None)
}

/// Whether `line` is `delimiter` followed by nothing but linear whitespace.
fn is_delimiter_line(line: &[u8], delimiter: &[u8]) -> bool {
    line.starts_with(delimiter)
        && line[delimiter.len()..]
            .iter()
            .all(|&b| b' ' == b || b'\t' == b)
}

fn strip_trailing_lwsp(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b' ' != b && b'\t' != b)
        .map_or(0, |ix| ix + 1);
    &line[..end]
}
