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

//! The ordered header list of an RFC 822 entity.
//!
//! `HeaderStore` keeps headers in the order they are to be written, which for
//! a store built from scratch follows a conventional ordering of well-known
//! headers, and for a store loaded from a stream is simply the order of the
//! physical lines. It refuses to hold more than one value for any header
//! except the trace headers `Received` and `Return-Path`.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};

use crate::support::error::Error;

/// Name of the entry marking where new headers are inserted.
///
/// No real header can have this name since `:` terminates a header name.
const INSERTION_MARKER: &str = ":";

/// The preferred order of well-known headers in a newly built store.
static CANONICAL_ORDER: &[&str] = &[
    "Return-Path",
    "Received",
    "Resent-Date",
    "Resent-From",
    "Resent-Sender",
    "Resent-To",
    "Resent-Cc",
    "Resent-Bcc",
    "Resent-Message-Id",
    "Date",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Message-Id",
    "In-Reply-To",
    "References",
    "Subject",
    "Comments",
    "Keywords",
    "Errors-To",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-MD5",
    INSERTION_MARKER,
    "Content-Length",
    "Status",
];

/// One logical header.
///
/// An entry with no value is a placeholder: it reserves a position for its
/// name but is invisible to everything that reads headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    name: String,
    value: Option<String>,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderEntry {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    fn placeholder(name: impl Into<String>) -> Self {
        HeaderEntry {
            name: name.into(),
            value: None,
        }
    }

    /// Split a raw logical line into name and value.
    ///
    /// A line without a `:` becomes a placeholder for the whole (trimmed)
    /// line. Whitespace, including folded line breaks, between the `:` and
    /// the first character of the value is dropped.
    fn from_line(line: &str) -> Self {
        match line.find(':') {
            None => HeaderEntry::placeholder(line.trim()),
            Some(sep) => HeaderEntry::new(
                &line[..sep],
                line[sep + 1..].trim_start_matches(|c| {
                    matches!(c, ' ' | '\t' | '\r' | '\n')
                }),
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }

    fn is_marker(&self) -> bool {
        self.value.is_none() && INSERTION_MARKER == self.name
    }

    fn is_named(&self, name: &str) -> bool {
        !self.is_marker() && self.name.eq_ignore_ascii_case(name)
    }

    fn append_value(&mut self, line: &str) {
        match self.value {
            None => self.value = Some(line.to_owned()),
            Some(ref mut value) => {
                value.push_str("\r\n");
                value.push_str(line);
            }
        }
    }

    fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        if let Some(ref value) = self.value {
            let mut line = Vec::with_capacity(
                self.name.len() + value.len() + 4,
            );
            encode_text(&self.name, &mut line);
            line.extend_from_slice(b": ");
            encode_text(value, &mut line);
            line.extend_from_slice(b"\r\n");
            out.write_all(&line)?;
        }

        Ok(())
    }
}

impl fmt::Display for HeaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value().unwrap_or(""))
    }
}

/// Whether `name` is one of the trace headers, which may repeat and are kept
/// newest-first.
fn is_trace_header(name: &str) -> bool {
    "Received".eq_ignore_ascii_case(name)
        || "Return-Path".eq_ignore_ascii_case(name)
}

/// Write `s` one byte per character where possible.
///
/// Characters beyond U+00FF can only have come from UTF-8 input or from the
/// caller, so those are written as UTF-8.
pub(crate) fn encode_text(s: &str, out: &mut Vec<u8>) {
    let mut utf8 = [0u8; 4];
    for ch in s.chars() {
        if (ch as u32) < 256 {
            out.push(ch as u32 as u8);
        } else {
            out.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
        }
    }
}

fn decode_text(bytes: Vec<u8>, allow_utf8: bool) -> String {
    if allow_utf8 {
        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    } else {
        bytes.into_iter().map(char::from).collect()
    }
}

fn read_byte(r: &mut impl Read) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(ref e) if io::ErrorKind::Interrupted == e.kind() => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Read one physical header line, without its line ending.
///
/// CR characters are discarded wherever they occur. Returns `None` for the
/// blank line ending the header block, or at end of input.
///
/// Reads one byte at a time so that nothing past the blank line is consumed.
fn read_header_line(
    r: &mut impl Read,
    allow_utf8: bool,
) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    while let Some(b) = read_byte(r)? {
        match b {
            b'\n' => break,
            b'\r' => (),
            b => line.push(b),
        }
    }

    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(decode_text(line, allow_utf8)))
    }
}

/// An ordered list of headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderStore {
    entries: Vec<HeaderEntry>,
}

impl Default for HeaderStore {
    fn default() -> Self {
        HeaderStore::new()
    }
}

impl HeaderStore {
    /// Create an empty store pre-seeded with the conventional header order.
    pub fn new() -> Self {
        HeaderStore {
            entries: CANONICAL_ORDER
                .iter()
                .map(|&name| HeaderEntry::placeholder(name))
                .collect(),
        }
    }

    /// Load a header block from `r`.
    ///
    /// Reading stops after the blank line which ends the block (or at end of
    /// input), so `r` is left positioned at the start of the body. Folded
    /// lines are joined with CRLF. Repeated headers are kept exactly as they
    /// occur; the uniqueness rules only apply to later modifications.
    ///
    /// If `allow_utf8` is false, each byte becomes one character.
    pub fn load(r: &mut impl Read, allow_utf8: bool) -> Result<Self, Error> {
        let mut this = HeaderStore {
            entries: Vec::new(),
        };
        let mut pending = String::new();

        while let Some(line) = read_header_line(r, allow_utf8)? {
            if line.starts_with(' ') || line.starts_with('\t') {
                if pending.is_empty() {
                    this.add_line(&line);
                } else {
                    pending.push_str("\r\n");
                    pending.push_str(&line);
                }
            } else {
                if !pending.is_empty() {
                    this.add_line(&pending);
                    pending.clear();
                }
                pending.push_str(&line);
            }
        }

        if !pending.is_empty() {
            this.add_line(&pending);
        }

        Ok(this)
    }

    /// Return all values of the header `name`, in order, or `None` if there
    /// are none.
    pub fn get_all(&self, name: &str) -> Option<Vec<&str>> {
        let values = self
            .entries
            .iter()
            .filter(|e| e.is_named(name))
            .filter_map(HeaderEntry::value)
            .collect::<Vec<_>>();

        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    /// Return the values of `name` joined by `delimiter`, or just the first
    /// value if there is no delimiter.
    pub fn get(
        &self,
        name: &str,
        delimiter: Option<&str>,
    ) -> Option<Cow<'_, str>> {
        let values = self.get_all(name)?;
        match delimiter {
            Some(delimiter) if values.len() > 1 => {
                Some(Cow::Owned(values.join(delimiter)))
            }
            _ => Some(Cow::Borrowed(values[0])),
        }
    }

    /// Return the first value of `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|e| e.is_named(name))
            .find_map(HeaderEntry::value)
    }

    /// Set the header `name` to `value`, replacing all existing values.
    ///
    /// The first existing entry (including a placeholder) keeps its position
    /// and takes the case of `name`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.position(name, 0) {
            Some(pos) => {
                let entry = &mut self.entries[pos];
                entry.name = name.to_owned();
                entry.value = Some(value.into());
                self.delete_from(name, pos + 1);
            }
            None => self.place(HeaderEntry::new(name, value)),
        }
    }

    /// Add a value for the header `name`.
    ///
    /// `Received` and `Return-Path` may be added any number of times; each
    /// new value goes before the existing ones. Any other header which
    /// already has a value is rejected with `DuplicateHeader`.
    pub fn add(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), Error> {
        if !is_trace_header(name)
            && self
                .entries
                .iter()
                .any(|e| !e.is_placeholder() && e.is_named(name))
        {
            return Err(Error::DuplicateHeader(name.to_owned()));
        }

        self.place(HeaderEntry::new(name, value));
        Ok(())
    }

    /// Remove all values of the header `name`.
    ///
    /// The first entry is kept as a placeholder so a later `set` or `add`
    /// puts the header back where it was.
    pub fn remove(&mut self, name: &str) {
        if let Some(pos) = self.position(name, 0) {
            self.entries[pos].value = None;
            self.delete_from(name, pos + 1);
        }
    }

    /// Add one raw header line.
    ///
    /// A line starting with whitespace continues the last entry. Anything else
    /// is appended as a new entry, without regard to uniqueness.
    pub fn add_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            // A continuation with nothing to continue is dropped
            if let Some(last) = self.entries.last_mut() {
                last.append_value(line);
            }
        } else {
            self.entries.push(HeaderEntry::from_line(line));
        }
    }

    /// Iterate over all headers which have values.
    pub fn all(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter().filter(|e| !e.is_placeholder())
    }

    /// Iterate over the headers named in `names`.
    pub fn matching<'a>(
        &'a self,
        names: &'a [&'a str],
    ) -> impl Iterator<Item = &'a HeaderEntry> + 'a {
        self.all().filter(move |e| name_in(&e.name, names))
    }

    /// Iterate over the headers not named in `names`.
    pub fn non_matching<'a>(
        &'a self,
        names: &'a [&'a str],
    ) -> impl Iterator<Item = &'a HeaderEntry> + 'a {
        self.all().filter(move |e| !name_in(&e.name, names))
    }

    /// All headers, formatted as `Name: Value`.
    pub fn all_lines(&self) -> Vec<String> {
        self.all().map(HeaderEntry::to_string).collect()
    }

    pub fn matching_lines(&self, names: &[&str]) -> Vec<String> {
        self.matching(names).map(HeaderEntry::to_string).collect()
    }

    pub fn non_matching_lines(&self, names: &[&str]) -> Vec<String> {
        self.non_matching(names).map(HeaderEntry::to_string).collect()
    }

    /// The number of headers with values.
    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Write every header except those named in `exclude` as
    /// `Name: Value\r\n`.
    pub fn serialize(
        &self,
        out: &mut impl Write,
        exclude: &[&str],
    ) -> io::Result<()> {
        for entry in self.non_matching(exclude) {
            entry.write_to(out)?;
        }

        Ok(())
    }

    fn position(&self, name: &str, start: usize) -> Option<usize> {
        self.entries[start..]
            .iter()
            .position(|e| e.is_named(name))
            .map(|ix| ix + start)
    }

    fn delete_from(&mut self, name: &str, start: usize) {
        let mut ix = start;
        while ix < self.entries.len() {
            if self.entries[ix].is_named(name) {
                self.entries.remove(ix);
            } else {
                ix += 1;
            }
        }
    }

    /// Put `entry` where it belongs, without any uniqueness check.
    fn place(&mut self, entry: HeaderEntry) {
        let trace = is_trace_header(&entry.name);
        match self.position(&entry.name, 0) {
            Some(pos) if self.entries[pos].is_placeholder() => {
                self.entries[pos].value = entry.value;
            }
            Some(pos) if trace => self.entries.insert(pos, entry),
            Some(pos) => {
                let mut last = pos;
                while let Some(next) = self.position(&entry.name, last + 1) {
                    last = next;
                }
                self.entries.insert(last + 1, entry);
            }
            None if trace => self.entries.insert(0, entry),
            None => {
                let pos = self
                    .entries
                    .iter()
                    .position(HeaderEntry::is_marker)
                    .unwrap_or(self.entries.len());
                self.entries.insert(pos, entry);
            }
        }
    }
}

fn name_in(name: &str, names: &[&str]) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn load(data: &[u8]) -> HeaderStore {
        let mut r = data;
        HeaderStore::load(&mut r, false).unwrap()
    }

    fn serialized(store: &HeaderStore, exclude: &[&str]) -> String {
        let mut out = Vec::new();
        store.serialize(&mut out, exclude).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn continuation_lines_are_folded() {
        let store = load(b"Subject: hello\r\n world\r\n\r\n");
        assert_eq!(Some(vec!["hello\r\n world"]), store.get_all("subject"));
        assert_eq!(1, store.len());
        assert_eq!("Subject: hello\r\n world\r\n", serialized(&store, &[]));
    }

    #[test]
    fn load_stops_after_blank_line() {
        let mut r: &[u8] = b"A: 1\nB:2\n\nA: body\r\n";
        let store = HeaderStore::load(&mut r, false).unwrap();
        assert_eq!(Some("1"), store.first("a"));
        assert_eq!(Some("2"), store.first("b"));
        assert_eq!(b"A: body\r\n", r);
    }

    #[test]
    fn load_keeps_duplicates_and_order() {
        let store = load(
            b"X-B: 1\r\n\
              X-A: 2\r\n\
              X-B: 3\r\n\
              \r\n",
        );
        assert_eq!(Some(vec!["1", "3"]), store.get_all("X-B"));
        assert_eq!(
            vec!["X-B: 1", "X-A: 2", "X-B: 3"],
            store.all_lines()
        );
        assert_eq!(Some(Cow::Borrowed("1")), store.get("x-b", None));
        assert_eq!(
            Some(Cow::<str>::Owned("1, 3".to_owned())),
            store.get("x-b", Some(", "))
        );
    }

    #[test]
    fn line_without_separator_is_placeholder() {
        let store = load(b"Bogus line\r\nX-Real:   value\r\n\r\n");
        assert_eq!(None, store.get_all("Bogus line"));
        assert_eq!(Some("value"), store.first("X-Real"));
        assert_eq!("X-Real: value\r\n", serialized(&store, &[]));
    }

    #[test]
    fn value_leading_fold_is_trimmed() {
        let store = load(b"To:\r\n  someone@example.com\r\n\r\n");
        assert_eq!(Some("someone@example.com"), store.first("To"));
    }

    #[test]
    fn leading_continuation_is_dropped() {
        let store = load(b" orphan\r\nA: b\r\n\r\n");
        assert_eq!(vec!["A: b"], store.all_lines());
    }

    #[test]
    fn latin1_and_utf8_decoding() {
        let latin1 = load(b"Subject: caf\xC3\xA9\r\n\r\n");
        assert_eq!(Some("caf\u{C3}\u{A9}"), latin1.first("Subject"));
        // Byte-per-character text goes back out unchanged
        let mut out = Vec::new();
        latin1.serialize(&mut out, &[]).unwrap();
        assert_eq!(b"Subject: caf\xC3\xA9\r\n", &out[..]);

        let mut r: &[u8] = b"Subject: caf\xC3\xA9\r\n\r\n";
        let utf8 = HeaderStore::load(&mut r, true).unwrap();
        assert_eq!(Some("café"), utf8.first("Subject"));
    }

    #[test]
    fn new_store_uses_canonical_order() {
        let mut store = HeaderStore::new();
        assert!(store.is_empty());

        store.add("Subject", "s").unwrap();
        store.add("X-Mailer", "m").unwrap();
        store.add("From", "f").unwrap();
        store.add("Content-Length", "3").unwrap();
        store.add("X-Other", "o").unwrap();

        assert_eq!(
            "From: f\r\n\
             Subject: s\r\n\
             X-Mailer: m\r\n\
             X-Other: o\r\n\
             Content-Length: 3\r\n",
            serialized(&store, &[])
        );
    }

    #[test]
    fn unknown_headers_append_without_marker() {
        let mut store = load(b"B: 1\r\nA: 2\r\n\r\n");
        store.add("C", "3").unwrap();
        assert_eq!(vec!["B: 1", "A: 2", "C: 3"], store.all_lines());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut store = HeaderStore::new();
        store.add("Subject", "one").unwrap();
        assert_matches!(
            Err(Error::DuplicateHeader(_)),
            store.add("SUBJECT", "two")
        );
        assert_eq!(Some(vec!["one"]), store.get_all("Subject"));
    }

    #[test]
    fn received_is_newest_first() {
        let mut store = HeaderStore::new();
        store.add("Received", "first").unwrap();
        store.add("Return-Path", "<a@b>").unwrap();
        store.add("received", "second").unwrap();
        store.add("Received", "third").unwrap();

        assert_eq!(
            Some(vec!["third", "second", "first"]),
            store.get_all("Received")
        );
        assert_eq!(
            vec![
                "Return-Path: <a@b>",
                "Received: third",
                "received: second",
                "Received: first",
            ],
            store.all_lines()
        );
    }

    #[test]
    fn received_without_placeholder_goes_first() {
        let mut store = load(b"Subject: x\r\n\r\n");
        store.add("Received", "by here").unwrap();
        assert_eq!(
            vec!["Received: by here", "Subject: x"],
            store.all_lines()
        );
    }

    #[test]
    fn set_replaces_all_and_takes_case() {
        let mut store = load(
            b"x-thing: 1\r\n\
              Other: a\r\n\
              X-THING: 2\r\n\
              \r\n",
        );
        store.set("X-Thing", "3");
        assert_eq!(vec!["X-Thing: 3", "Other: a"], store.all_lines());

        store.set("New", "n");
        assert_eq!(
            vec!["X-Thing: 3", "Other: a", "New: n"],
            store.all_lines()
        );
    }

    #[test]
    fn remove_keeps_position() {
        let mut store = HeaderStore::new();
        store.add("From", "f").unwrap();
        store.add("Subject", "s").unwrap();
        store.add("Date", "d").unwrap();
        store.remove("from");
        assert_eq!(None, store.get_all("From"));
        assert_eq!(vec!["Date: d", "Subject: s"], store.all_lines());

        store.add("FROM", "again").unwrap();
        assert_eq!(
            vec!["Date: d", "From: again", "Subject: s"],
            store.all_lines()
        );
    }

    #[test]
    fn remove_deletes_later_duplicates() {
        let mut store = load(b"A: 1\r\nB: 2\r\nA: 3\r\n\r\n");
        store.remove("A");
        assert_eq!(vec!["B: 2"], store.all_lines());
        store.add("A", "4").unwrap();
        assert_eq!(vec!["A: 4", "B: 2"], store.all_lines());
    }

    #[test]
    fn add_line_continues_last_entry() {
        let mut store = load(b"A: 1\r\n\r\n");
        store.add_line("\tmore");
        store.add_line("");
        store.add_line("B: 2");
        assert_eq!(Some("1\r\n\tmore"), store.first("A"));
        assert_eq!(Some("2"), store.first("B"));
    }

    #[test]
    fn matching_and_exclusion() {
        let store = load(
            b"From: f\r\n\
              Bcc: hidden\r\n\
              Subject: s\r\n\
              \r\n",
        );
        assert_eq!(vec!["Bcc: hidden"], store.matching_lines(&["BCC"]));
        assert_eq!(
            vec!["From: f", "Subject: s"],
            store.non_matching_lines(&["bcc"])
        );
        assert_eq!(
            "From: f\r\nSubject: s\r\n",
            serialized(&store, &["BCC"])
        );
    }

    #[derive(Clone, Debug)]
    enum Op {
        Add(usize, String),
        Set(usize, String),
        Remove(usize),
    }

    static OP_NAMES: &[&str] = &[
        "Subject",
        "subject",
        "X-Custom",
        "x-custom",
        "To",
        "Content-Length",
        "Received",
        "Return-Path",
    ];

    fn op_strategy() -> impl Strategy<Value = Op> {
        let name = 0..OP_NAMES.len();
        prop_oneof![
            (name.clone(), "[a-z]{1,4}").prop_map(|(n, v)| Op::Add(n, v)),
            (name.clone(), "[a-z]{1,4}").prop_map(|(n, v)| Op::Set(n, v)),
            name.prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn non_trace_headers_stay_unique(
            seed_loaded in any::<bool>(),
            ops in prop::collection::vec(op_strategy(), 0..40),
        ) {
            let mut store = if seed_loaded {
                load(b"Subject: loaded\r\nX-Custom: loaded\r\n\r\n")
            } else {
                HeaderStore::new()
            };

            for op in ops {
                match op {
                    Op::Add(n, v) => {
                        let _ = store.add(OP_NAMES[n], v);
                    }
                    Op::Set(n, v) => store.set(OP_NAMES[n], v),
                    Op::Remove(n) => store.remove(OP_NAMES[n]),
                }
            }

            for &name in OP_NAMES {
                if is_trace_header(name) {
                    continue;
                }

                prop_assert!(
                    store.get_all(name).map_or(0, |v| v.len()) <= 1,
                    "{:?}",
                    store
                );
            }
        }

        #[test]
        fn received_reads_back_reversed(
            values in prop::collection::vec("[a-z0-9 ]{1,8}", 1..20),
        ) {
            let mut store = HeaderStore::new();
            for v in &values {
                store.add("Received", v.clone()).unwrap();
            }

            let mut expected =
                values.iter().map(String::as_str).collect::<Vec<_>>();
            expected.reverse();
            prop_assert_eq!(Some(expected), store.get_all("Received"));
        }
    }
}
