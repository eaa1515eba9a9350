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

use std::io::{self, Read, Write};

use log::warn;

use super::content_type::ContentType;
use super::header::HeaderStore;
use super::multipart::MultipartEntity;
use super::serialize;
use crate::support::config::MultipartConfig;
use crate::support::error::Error;

/// The body of a `RawPart`.
#[derive(Debug)]
pub enum Body {
    /// Body content exactly as it appeared, with no transfer decoding.
    Bytes(Vec<u8>),
    /// A nested multipart, which may not have been scanned yet.
    Multipart(MultipartEntity),
}

/// A MIME entity: a header block and a body.
///
/// This is used both for whole messages and for the parts of a multipart.
#[derive(Debug)]
pub struct RawPart {
    headers: HeaderStore,
    body: Body,
}

impl RawPart {
    pub fn new(headers: HeaderStore, body: Vec<u8>) -> Self {
        RawPart {
            headers,
            body: Body::Bytes(body),
        }
    }

    /// Create a part holding `multipart`, setting `Content-Type`
    /// accordingly.
    pub fn multipart(
        mut headers: HeaderStore,
        multipart: MultipartEntity,
    ) -> Self {
        headers.set("Content-Type", multipart.content_type().to_string());
        RawPart {
            headers,
            body: Body::Multipart(multipart),
        }
    }

    /// Parse a complete entity, such as a whole message, from `reader`.
    ///
    /// Only the headers are read immediately. If the entity is a multipart,
    /// the rest of `reader` is kept and only scanned when the multipart's
    /// structure is first needed.
    pub fn parse<R: Read + Send + 'static>(
        reader: R,
        config: &MultipartConfig,
    ) -> Result<Self, Error> {
        let mut reader = io::BufReader::new(reader);
        let headers =
            HeaderStore::load(&mut reader, config.allow_utf8_headers)?;

        let body = match multipart_type(&headers, config, 0) {
            Some(ct) => Body::Multipart(MultipartEntity::from_source_at_depth(
                ct, reader, *config, 0,
            )),
            None => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                Body::Bytes(data)
            }
        };

        Ok(RawPart { headers, body })
    }

    /// Parse one part of a multipart being scanned, `depth` levels down.
    ///
    /// The part's content is buffered so that the enclosing scan can carry
    /// on; a nested multipart is scanned from that buffer on demand.
    pub(crate) fn parse_nested(
        r: &mut impl Read,
        config: &MultipartConfig,
        depth: u32,
    ) -> Result<Self, Error> {
        let headers = HeaderStore::load(r, config.allow_utf8_headers)?;
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;

        let body = match multipart_type(&headers, config, depth) {
            Some(ct) => Body::Multipart(MultipartEntity::from_source_at_depth(
                ct,
                io::Cursor::new(data),
                *config,
                depth,
            )),
            None => Body::Bytes(data),
        };

        Ok(RawPart { headers, body })
    }

    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderStore {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// The parsed `Content-Type` header, if present and understood.
    pub fn content_type(&self) -> Option<ContentType> {
        self.headers.first("Content-Type").and_then(ContentType::parse)
    }

    pub fn content_id(&self) -> Option<&str> {
        self.headers.first("Content-ID")
    }

    /// Bring `Content-Type` headers in line with any nested multiparts, at
    /// any depth.
    pub fn update_headers(&mut self) -> Result<(), Error> {
        if let Body::Multipart(ref mut multipart) = self.body {
            multipart.update_headers()?;
            self.headers
                .set("Content-Type", multipart.content_type().to_string());
        }

        Ok(())
    }

    pub fn write_to(&mut self, out: &mut impl Write) -> Result<(), Error> {
        serialize::write_part(out, self)
    }
}

/// If `headers` declare a multipart that should be decomposed at `depth`,
/// return its content type.
fn multipart_type(
    headers: &HeaderStore,
    config: &MultipartConfig,
    depth: u32,
) -> Option<ContentType> {
    let ct = headers
        .first("Content-Type")
        .and_then(ContentType::parse)
        .filter(ContentType::is_multipart)?;

    if depth >= config.max_nesting_depth {
        warn!(
            "multipart/{} nested {} levels deep, keeping it as raw content",
            ct.subtype, depth
        );
        return None;
    }

    Some(ct)
}
