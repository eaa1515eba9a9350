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

//! The multipart entity model.
//!
//! A `MultipartEntity` read from a byte source is not scanned until something
//! needs its structure. The scan runs at most once: the source is consumed
//! by it, and a failed scan leaves the entity permanently failed.

use std::fmt;
use std::io::{BufRead, Write};
use std::mem;

use log::debug;

use super::content_type::ContentType;
use super::parser::MultipartParser;
use super::part::RawPart;
use super::serialize::write_multipart;
use crate::support::boundary::BoundaryGenerator;
use crate::support::config::MultipartConfig;
use crate::support::error::Error;

enum Source {
    /// The structure is fully in memory.
    Parsed,
    /// Not scanned yet; the whole body is still in the reader.
    Pending(Box<dyn BufRead + Send>),
    /// The scan failed part way through.
    Failed,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Source::Parsed => write!(f, "Parsed"),
            Source::Pending(_) => write!(f, "Pending(..)"),
            Source::Failed => write!(f, "Failed"),
        }
    }
}

/// A multipart body: an optional preamble and a sequence of parts.
#[derive(Debug)]
pub struct MultipartEntity {
    content_type: ContentType,
    boundary: Option<String>,
    preamble: Option<Vec<u8>>,
    parts: Vec<RawPart>,
    complete: bool,
    config: MultipartConfig,
    depth: u32,
    source: Source,
}

impl MultipartEntity {
    /// Create an empty `multipart/{subtype}` with a fresh boundary from
    /// `generator`.
    pub fn new(
        subtype: &str,
        generator: &BoundaryGenerator,
        config: MultipartConfig,
    ) -> Self {
        let boundary = generator.generate();
        let mut content_type = ContentType::new("multipart", subtype);
        content_type.set_parm("boundary", boundary.clone());

        MultipartEntity {
            content_type,
            boundary: Some(boundary),
            preamble: None,
            parts: vec![],
            complete: true,
            config,
            depth: 0,
            source: Source::Parsed,
        }
    }

    /// Create a `multipart/{subtype}` holding `parts`.
    pub fn with_parts(
        subtype: &str,
        generator: &BoundaryGenerator,
        config: MultipartConfig,
        parts: Vec<RawPart>,
    ) -> Self {
        let mut this = MultipartEntity::new(subtype, generator, config);
        this.parts = parts;
        this
    }

    /// Create an entity whose body will be read from `reader` on first use.
    ///
    /// `content_type` is the value of the `Content-Type` header which
    /// introduced the body; its `boundary` parameter, if any, is the declared
    /// boundary.
    pub fn from_source(
        content_type: ContentType,
        reader: impl BufRead + Send + 'static,
        config: MultipartConfig,
    ) -> Self {
        MultipartEntity::from_source_at_depth(content_type, reader, config, 0)
    }

    pub(crate) fn from_source_at_depth(
        content_type: ContentType,
        reader: impl BufRead + Send + 'static,
        config: MultipartConfig,
        depth: u32,
    ) -> Self {
        MultipartEntity {
            boundary: content_type.parm("boundary").map(str::to_owned),
            content_type,
            preamble: None,
            parts: vec![],
            complete: false,
            config,
            depth,
            source: Source::Pending(Box::new(reader)),
        }
    }

    /// Whether the body has been scanned (successfully or not).
    pub fn is_parsed(&self) -> bool {
        !matches!(self.source, Source::Pending(_))
    }

    /// The content type of this entity.
    ///
    /// Once the body has been scanned, the `boundary` parameter is the
    /// boundary actually in use, which is not necessarily the declared one.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn subtype(&self) -> &str {
        &self.content_type.subtype
    }

    pub fn set_subtype(&mut self, subtype: &str) {
        self.content_type.subtype = subtype.to_ascii_lowercase();
    }

    /// Scan the body if that hasn't happened yet.
    fn ensure_parsed(&mut self) -> Result<(), Error> {
        // Anything but a clean return leaves the entity failed
        match mem::replace(&mut self.source, Source::Failed) {
            Source::Parsed => {
                self.source = Source::Parsed;
                Ok(())
            }
            Source::Failed => Err(Error::MalformedStructure(format!(
                "multipart/{} could not be parsed",
                self.content_type.subtype
            ))),
            Source::Pending(reader) => {
                debug!(
                    "Scanning multipart/{} at depth {}",
                    self.content_type.subtype, self.depth
                );

                let parsed = MultipartParser::new(&self.config, self.depth)
                    .parse(&self.content_type, reader)?;

                if let Some(ref boundary) = parsed.boundary {
                    self.content_type.set_parm("boundary", boundary.clone());
                }
                self.boundary = parsed.boundary;
                self.preamble = parsed.preamble;
                self.parts = parsed.parts;
                self.complete = parsed.complete;
                self.source = Source::Parsed;

                debug!(
                    "multipart/{} has {} part(s){}",
                    self.content_type.subtype,
                    self.parts.len(),
                    if self.complete { "" } else { ", incomplete" }
                );
                Ok(())
            }
        }
    }

    pub fn count(&mut self) -> Result<usize, Error> {
        self.ensure_parsed()?;
        Ok(self.parts.len())
    }

    pub fn part(&mut self, index: usize) -> Result<Option<&RawPart>, Error> {
        self.ensure_parsed()?;
        Ok(self.parts.get(index))
    }

    pub fn part_mut(
        &mut self,
        index: usize,
    ) -> Result<Option<&mut RawPart>, Error> {
        self.ensure_parsed()?;
        Ok(self.parts.get_mut(index))
    }

    pub fn parts(&mut self) -> Result<&[RawPart], Error> {
        self.ensure_parsed()?;
        Ok(&self.parts)
    }

    /// Find the first direct child whose `Content-ID` is `cid`.
    pub fn part_by_content_id(
        &mut self,
        cid: &str,
    ) -> Result<Option<&RawPart>, Error> {
        self.ensure_parsed()?;
        Ok(self
            .parts
            .iter()
            .find(|p| p.content_id().map(str::trim) == Some(cid)))
    }

    /// Whether the body ended with a final boundary.
    ///
    /// Always true for entities built in memory.
    pub fn is_complete(&mut self) -> Result<bool, Error> {
        self.ensure_parsed()?;
        Ok(self.complete)
    }

    pub fn preamble(&mut self) -> Result<Option<&[u8]>, Error> {
        self.ensure_parsed()?;
        Ok(self.preamble.as_deref())
    }

    /// Replace the preamble.
    ///
    /// The preamble is written followed by a line ending, so it should not
    /// end with one itself.
    pub fn set_preamble(
        &mut self,
        preamble: Option<Vec<u8>>,
    ) -> Result<(), Error> {
        self.ensure_parsed()?;
        self.preamble = preamble;
        Ok(())
    }

    pub fn add_part(&mut self, part: RawPart) -> Result<(), Error> {
        self.ensure_parsed()?;
        self.parts.push(part);
        Ok(())
    }

    /// Insert `part` at `index`, or at the end if `index` is past the end.
    pub fn insert_part(
        &mut self,
        index: usize,
        part: RawPart,
    ) -> Result<(), Error> {
        self.ensure_parsed()?;
        let index = index.min(self.parts.len());
        self.parts.insert(index, part);
        Ok(())
    }

    pub fn remove_part(
        &mut self,
        index: usize,
    ) -> Result<Option<RawPart>, Error> {
        self.ensure_parsed()?;
        if index < self.parts.len() {
            Ok(Some(self.parts.remove(index)))
        } else {
            Ok(None)
        }
    }

    /// Make sure this entity has a boundary and that every nested multipart's
    /// owning part declares that multipart's current content type.
    pub fn update_headers(&mut self) -> Result<(), Error> {
        self.ensure_parsed()?;
        self.ensure_boundary();
        for part in &mut self.parts {
            part.update_headers()?;
        }
        Ok(())
    }

    fn ensure_boundary(&mut self) {
        if self.boundary.is_none() {
            let boundary = BoundaryGenerator::global().generate();
            debug!("Generated boundary {:?}", boundary);
            self.content_type.set_parm("boundary", boundary.clone());
            self.boundary = Some(boundary);
        }
    }

    /// Write the body of this entity, from the preamble to the final
    /// boundary.
    ///
    /// The owning headers are not written; see `RawPart::write_to`.
    pub fn write_to(&mut self, out: &mut impl Write) -> Result<(), Error> {
        self.ensure_parsed()?;
        self.ensure_boundary();

        let boundary = self.boundary.as_deref().unwrap_or_default();
        write_multipart(
            out,
            boundary,
            self.preamble.as_deref(),
            &mut self.parts,
            self.config.allow_empty_multipart,
        )
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::mime::header::HeaderStore;
    use crate::mime::part::Body;
    use crate::test_data::*;

    fn parse(data: &'static [u8], config: MultipartConfig) -> RawPart {
        RawPart::parse(data, &config).unwrap()
    }

    fn multipart(part: &mut RawPart) -> &mut MultipartEntity {
        match *part.body_mut() {
            Body::Multipart(ref mut multipart) => multipart,
            Body::Bytes(_) => panic!("not a multipart"),
        }
    }

    fn bytes(part: &RawPart) -> &[u8] {
        match *part.body() {
            Body::Bytes(ref data) => data,
            Body::Multipart(_) => panic!("unexpected multipart"),
        }
    }

    #[test]
    fn nested_message_round_trips() {
        let mut message = parse(NESTED, MultipartConfig::default());
        let mut out = Vec::new();
        message.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8_lossy(NESTED),
            String::from_utf8_lossy(&out)
        );
    }

    #[test]
    fn nested_message_structure() {
        let mut message = parse(NESTED, MultipartConfig::default());
        assert_eq!(2, message.headers().get_all("Received").unwrap().len());

        let top = multipart(&mut message);
        assert!(!top.is_parsed());
        assert_eq!(3, top.count().unwrap());
        assert!(top.is_parsed());
        assert!(top.is_complete().unwrap());
        assert_eq!(
            Some(&b"This is a multi-part message in MIME format."[..]),
            top.preamble().unwrap()
        );
        assert_eq!(Some("outer"), top.content_type().parm("boundary"));

        assert_eq!(
            &b"Hello Bob,\r\n\r\nthe figures are attached."[..],
            bytes(top.part(0).unwrap().unwrap())
        );

        let attachment = top
            .part_by_content_id("<figures@example.com>")
            .unwrap()
            .unwrap();
        assert_eq!(
            Some("base64"),
            attachment.headers().first("Content-Transfer-Encoding")
        );
        assert_eq!(b"AAECAwQFBgcICQ==", bytes(attachment));
        assert!(top.part_by_content_id("<nothing>").unwrap().is_none());

        let inner = multipart(top.part_mut(1).unwrap().unwrap());
        assert_eq!("alternative", inner.subtype());
        assert!(!inner.is_parsed());
        assert_eq!(2, inner.count().unwrap());
        assert!(inner.preamble().unwrap().is_none());
        let html = inner.part(1).unwrap().unwrap();
        assert!(html.content_type().unwrap().is_subtype("html"));
        assert_eq!(b"<p>html</p>", bytes(html));

        assert!(top.part(3).unwrap().is_none());
    }

    #[test]
    fn nesting_limit_keeps_deep_multiparts_raw() {
        let config = MultipartConfig {
            max_nesting_depth: 1,
            ..MultipartConfig::default()
        };
        let mut message = parse(NESTED, config);
        let top = multipart(&mut message);
        let alternative = top.part(1).unwrap().unwrap();
        assert!(bytes(alternative).starts_with(b"--inner\r\n"));

        let mut out = Vec::new();
        message.write_to(&mut out).unwrap();
        assert_eq!(NESTED, &out[..]);
    }

    #[test]
    fn truncated_multipart_tolerated() {
        let mut message = parse(TRUNCATED, MultipartConfig::default());
        let top = multipart(&mut message);
        assert_eq!(2, top.count().unwrap());
        assert!(!top.is_complete().unwrap());
        assert_eq!(b"complete part", bytes(top.part(0).unwrap().unwrap()));
        assert_eq!(
            b"this part never ends\r\n",
            bytes(top.part(1).unwrap().unwrap())
        );
    }

    #[test]
    fn truncated_multipart_rejected_then_failed() {
        let config = MultipartConfig {
            ignore_missing_end_boundary: false,
            ..MultipartConfig::default()
        };
        let mut message = parse(TRUNCATED, config);
        let top = multipart(&mut message);
        assert_matches!(Err(Error::IncompleteMultipart), top.count());
        assert!(top.is_parsed());
        assert_matches!(Err(Error::MalformedStructure(_)), top.count());
        assert_matches!(
            Err(Error::MalformedStructure(_)),
            top.write_to(&mut io::sink())
        );
    }

    #[test]
    fn nested_final_boundary_gains_line_ending() {
        // The line ending after the inner final boundary is taken by the
        // outer boundary, and the writer always puts one after each part,
        // so output has a blank line there even if the input did not.
        let input = b"Content-Type: multipart/mixed; boundary=outer\r\n\
                      \r\n\
                      --outer\r\n\
                      Content-Type: multipart/alternative; boundary=inner\r\n\
                      \r\n\
                      --inner\r\n\
                      \r\n\
                      plain\r\n\
                      --inner--\r\n\
                      --outer--\r\n";
        let mut message = parse(input, MultipartConfig::default());
        let mut out = Vec::new();
        message.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8_lossy(input).replace(
                "--inner--\r\n--outer--",
                "--inner--\r\n\r\n--outer--"
            ),
            String::from_utf8_lossy(&out)
        );

        {
            let top = multipart(&mut message);
            assert!(top.is_complete().unwrap());
            let inner = multipart(top.part_mut(0).unwrap().unwrap());
            assert!(inner.is_complete().unwrap());
            assert_eq!(b"plain", bytes(inner.part(0).unwrap().unwrap()));
        }

        // The extra line ending is stable across further cycles
        let mut reparsed = RawPart::parse(
            io::Cursor::new(out.clone()),
            &MultipartConfig::default(),
        )
        .unwrap();
        let mut again = Vec::new();
        reparsed.write_to(&mut again).unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn undeclared_boundary_is_found_and_propagated() {
        let mut message =
            parse(UNDECLARED_BOUNDARY, MultipartConfig::default());
        {
            let top = multipart(&mut message);
            assert_eq!(2, top.count().unwrap());
            assert_eq!(
                Some(&b"preamble line\r\n"[..]),
                top.preamble().unwrap()
            );
            assert_eq!(Some("guessed"), top.content_type().parm("boundary"));
        }

        assert_eq!(
            Some("multipart/related"),
            message.headers().first("Content-Type")
        );
        message.update_headers().unwrap();
        assert_eq!(
            Some("multipart/related; boundary=guessed"),
            message.headers().first("Content-Type")
        );

        let mut out = Vec::new();
        message.write_to(&mut out).unwrap();
        let expected = String::from_utf8_lossy(UNDECLARED_BOUNDARY).replace(
            "Content-Type: multipart/related\r\n",
            "Content-Type: multipart/related; boundary=guessed\r\n",
        );
        assert_eq!(expected, String::from_utf8_lossy(&out));
    }

    #[test]
    fn undeclared_boundary_rejected_when_strict() {
        let config = MultipartConfig {
            ignore_missing_boundary_parameter: false,
            ..MultipartConfig::default()
        };
        let mut message = parse(UNDECLARED_BOUNDARY, config);
        assert_matches!(
            Err(Error::MalformedStructure(_)),
            multipart(&mut message).count()
        );
    }

    #[test]
    fn build_write_and_reparse() {
        let generator = BoundaryGenerator::new();
        let mut entity = MultipartEntity::new(
            "mixed",
            &generator,
            MultipartConfig::default(),
        );
        let boundary = entity.content_type().parm("boundary").unwrap();
        let boundary = boundary.to_owned();
        assert!(boundary.starts_with("----=_Part_0_"));

        let mut headers = HeaderStore::new();
        headers.set("Content-Type", "text/plain");
        entity
            .add_part(RawPart::new(headers, b"second".to_vec()))
            .unwrap();
        entity
            .insert_part(0, RawPart::new(HeaderStore::new(), b"first".to_vec()))
            .unwrap();
        entity.set_preamble(Some(b"preamble".to_vec())).unwrap();
        assert!(entity.is_complete().unwrap());

        let mut out = Vec::new();
        entity.write_to(&mut out).unwrap();
        assert_eq!(
            format!(
                "preamble\r\n\
                 --{b}\r\n\
                 \r\n\
                 first\r\n\
                 --{b}\r\n\
                 Content-Type: text/plain\r\n\
                 \r\n\
                 second\r\n\
                 --{b}--\r\n",
                b = boundary
            ),
            String::from_utf8(out.clone()).unwrap()
        );

        let mut reparsed = MultipartEntity::from_source(
            entity.content_type().clone(),
            io::Cursor::new(out),
            MultipartConfig::default(),
        );
        assert_eq!(2, reparsed.count().unwrap());
        assert_eq!(Some(&b"preamble"[..]), reparsed.preamble().unwrap());

        let first = reparsed.remove_part(0).unwrap().unwrap();
        assert_eq!(b"first", bytes(&first));
        assert!(first.headers().is_empty());
        assert!(reparsed.remove_part(5).unwrap().is_none());
        assert_eq!(1, reparsed.count().unwrap());
        assert_eq!(
            Some("text/plain"),
            reparsed.parts().unwrap()[0].headers().first("content-type")
        );
    }

    #[test]
    fn empty_multipart_writing() {
        let generator = BoundaryGenerator::new();
        let mut entity = MultipartEntity::new(
            "mixed",
            &generator,
            MultipartConfig::default(),
        );
        let mut out = Vec::new();
        assert_matches!(
            Err(Error::EmptyMultipartNotAllowed),
            entity.write_to(&mut out)
        );
        assert!(out.is_empty());

        let mut entity = MultipartEntity::new(
            "mixed",
            &generator,
            MultipartConfig {
                allow_empty_multipart: true,
                ..MultipartConfig::default()
            },
        );
        entity.write_to(&mut out).unwrap();
        let boundary = entity.content_type().parm("boundary").unwrap();
        assert!(boundary.starts_with("----=_Part_1_"));
        assert_eq!(
            format!("--{}--\r\n", boundary),
            String::from_utf8(out).unwrap()
        );
    }

    #[test]
    fn subtype_change_shows_in_content_type() {
        let mut entity = MultipartEntity::with_parts(
            "mixed",
            &BoundaryGenerator::new(),
            MultipartConfig::default(),
            vec![RawPart::new(HeaderStore::new(), b"x".to_vec())],
        );
        entity.set_subtype("Alternative");
        assert_eq!("alternative", entity.subtype());
        assert!(entity
            .content_type()
            .to_string()
            .starts_with("multipart/alternative; boundary=\"----=_Part_0_"));
        assert_eq!(1, entity.count().unwrap());
    }

    struct FailingReader(&'static [u8]);

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))
            } else {
                self.0.read(buf)
            }
        }
    }

    #[test]
    fn source_failure_leaves_entity_failed() {
        let mut entity = MultipartEntity::from_source(
            ContentType::parse("multipart/mixed; boundary=b").unwrap(),
            io::BufReader::new(FailingReader(b"--b\r\nA: 1\r\n\r\nbo")),
            MultipartConfig::default(),
        );

        match entity.count() {
            Err(Error::Io(e)) => {
                assert_eq!(io::ErrorKind::ConnectionReset, e.kind())
            }
            r => panic!("unexpected result: {:?}", r),
        }
        assert!(entity.is_parsed());

        assert_matches!(Err(Error::MalformedStructure(_)), entity.count());
        assert_matches!(
            Err(Error::MalformedStructure(_)),
            entity.update_headers()
        );
        assert_matches!(
            Err(Error::MalformedStructure(_)),
            entity.add_part(RawPart::new(HeaderStore::new(), vec![]))
        );
    }

    struct CountingReader {
        data: io::Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.data.read(buf)
        }
    }

    #[test]
    fn source_is_scanned_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            data: io::Cursor::new(
                b"--b\r\nA: 1\r\n\r\nbody\r\n--b--\r\n".to_vec(),
            ),
            reads: Arc::clone(&reads),
        };
        let mut entity = MultipartEntity::from_source(
            ContentType::parse("multipart/mixed; boundary=b").unwrap(),
            io::BufReader::new(reader),
            MultipartConfig::default(),
        );
        assert_eq!(0, reads.load(Ordering::SeqCst));

        assert_eq!(1, entity.count().unwrap());
        let after_scan = reads.load(Ordering::SeqCst);
        assert!(after_scan > 0);

        assert_eq!(1, entity.count().unwrap());
        assert_eq!(b"body", bytes(entity.part(0).unwrap().unwrap()));
        entity.update_headers().unwrap();
        entity.write_to(&mut io::sink()).unwrap();
        assert_eq!(after_scan, reads.load(Ordering::SeqCst));
    }
}
