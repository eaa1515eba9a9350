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

//! Just enough of RFC 2045 `Content-Type` to drive multipart decomposition.

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{is_not, take, take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::map;
use nom::multi::{fold_many0, many0};
use nom::sequence::{delimited, preceded, tuple};
use nom::IResult;

/// A parsed content type.
///
/// The type, subtype and parameter names are normalised to lower case.
/// Parameter values are kept as given, with quoting removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

// RFC 2045 tspecials, plus space and controls
fn is_token_char(ch: u8) -> bool {
    ch > b' '
        && ch < 127
        && !matches!(
            ch,
            b'(' | b')'
                | b'<'
                | b'>'
                | b'@'
                | b','
                | b';'
                | b':'
                | b'\\'
                | b'"'
                | b'/'
                | b'['
                | b']'
                | b'?'
                | b'='
        )
}

fn is_lws(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\r' | b'\n')
}

fn lws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_lws)(i)
}

fn token(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_token_char)(i)
}

fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        char('"'),
        fold_many0(
            alt((preceded(char('\\'), take(1usize)), is_not("\\\""))),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        char('"'),
    )(i)
}

fn parameter(i: &[u8]) -> IResult<&[u8], (Vec<u8>, Vec<u8>)> {
    map(
        tuple((
            lws,
            char(';'),
            lws,
            token,
            lws,
            char('='),
            lws,
            alt((quoted_string, map(token, |t: &[u8]| t.to_vec()))),
        )),
        |(_, _, _, name, _, _, _, value)| (name.to_vec(), value),
    )(i)
}

fn content_type(
    i: &[u8],
) -> IResult<&[u8], (&[u8], &[u8], Vec<(Vec<u8>, Vec<u8>)>)> {
    map(
        tuple((lws, token, lws, char('/'), lws, token, many0(parameter))),
        |(_, typ, _, _, _, subtype, parms)| (typ, subtype, parms),
    )(i)
}

fn lossy(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

impl ContentType {
    pub fn new(typ: &str, subtype: &str) -> Self {
        ContentType {
            typ: typ.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parms: vec![],
        }
    }

    /// Parse a `Content-Type` header value.
    ///
    /// Anything after the last well-formed parameter is ignored. Returns
    /// `None` if there isn't even a `type/subtype`.
    pub fn parse(value: &str) -> Option<Self> {
        let (_, (typ, subtype, parms)) =
            content_type(value.as_bytes()).ok()?;
        Some(ContentType {
            typ: lossy(typ).to_ascii_lowercase(),
            subtype: lossy(subtype).to_ascii_lowercase(),
            parms: parms
                .into_iter()
                .map(|(k, v)| (lossy(&k).to_ascii_lowercase(), lossy(&v)))
                .collect(),
        })
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is_subtype(&self, subtype: &str) -> bool {
        self.subtype.eq_ignore_ascii_case(subtype)
    }

    pub fn is_multipart(&self) -> bool {
        self.is_type("multipart")
    }

    /// Return the first parameter named `name`.
    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms
            .iter()
            .find(|p| p.0.eq_ignore_ascii_case(name))
            .map(|p| p.1.as_str())
    }

    /// Set the parameter `name`, replacing any existing value in place.
    pub fn set_parm(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .parms
            .iter_mut()
            .find(|p| p.0.eq_ignore_ascii_case(name))
        {
            Some(p) => p.1 = value,
            None => self.parms.push((name.to_ascii_lowercase(), value)),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.subtype)?;
        for &(ref k, ref v) in &self.parms {
            if !v.is_empty() && v.bytes().all(is_token_char) {
                write!(f, "; {}={}", k, v)?;
            } else {
                write!(f, "; {}=\"", k)?;
                for ch in v.chars() {
                    if '"' == ch || '\\' == ch {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", ch)?;
                }
                write!(f, "\"")?;
            }
        }

        Ok(())
    }
}
