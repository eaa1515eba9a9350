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

//! Detection of multipart boundaries in a byte stream.
//!
//! `BoundaryScanner` presents the content of one multipart part as a stream
//! of its own, ending at the next boundary line. It only ever looks for a
//! boundary directly after a line ending, and only buffers as much as it
//! takes to decide whether the line is really a boundary: the boundary itself
//! plus a bounded run of trailing whitespace.
//!
//! The line ending before a boundary belongs to the boundary, not to the
//! content, so a part written as `body\r\n--XYZ` has content `body`.
//!
//! Both CRLF and bare LF line endings are accepted in front of a boundary.
//! (Strictly, only CRLF is correct, but nothing picks a boundary that occurs
//! in binary content after a LF alone.)

use std::io::{self, BufRead, Read};

use crate::support::lookahead::Lookahead;

/// Extra lookahead beyond the boundary itself, to absorb trailing whitespace
/// and the line ending on a boundary line.
pub const BOUNDARY_SLACK: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// Still passing content through.
    Content,
    /// Stopped at a boundary introducing another part.
    Boundary,
    /// Stopped at the final `--boundary--` line.
    FinalBoundary,
    /// The underlying stream ended without a boundary.
    EndOfStream,
}

/// Reads the content of one part from `source`, stopping at `boundary`.
///
/// `boundary` is the full delimiter as it appears on the wire, including the
/// leading `--`.
///
/// Once the scanner has stopped, `state()` tells why. If it stopped at a
/// non-final boundary, `source` is positioned at the start of the next
/// part's headers.
#[derive(Debug)]
pub struct BoundaryScanner<'a, R> {
    source: &'a mut Lookahead<R>,
    boundary: &'a [u8],
    state: ScanState,
}

impl<'a, R: BufRead> BoundaryScanner<'a, R> {
    pub fn new(source: &'a mut Lookahead<R>, boundary: &'a [u8]) -> Self {
        assert!(!boundary.is_empty());
        BoundaryScanner {
            source,
            boundary,
            state: ScanState::Content,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether the part ended at a boundary of either kind.
    pub fn boundary_found(&self) -> bool {
        matches!(self.state, ScanState::Boundary | ScanState::FinalBoundary)
    }

    pub fn final_boundary_found(&self) -> bool {
        ScanState::FinalBoundary == self.state
    }

    /// Return the next content byte, or `None` once the part has ended.
    pub fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if ScanState::Content != self.state {
            return Ok(None);
        }

        let first = match self.source.read_byte()? {
            Some(b) => b,
            None => {
                // Running out of input is never taken as a boundary, so the
                // caller can tell that the end boundary is missing.
                self.state = ScanState::EndOfStream;
                return Ok(None);
            }
        };

        if b'\r' != first && b'\n' != first {
            return Ok(Some(first));
        }

        self.source.mark(self.boundary.len() + BOUNDARY_SLACK);
        match self.match_boundary_line(first)? {
            Some(state) => {
                self.source.unmark();
                self.state = state;
                Ok(None)
            }
            None => {
                self.source.reset()?;
                Ok(Some(first))
            }
        }
    }

    /// Having just read the line-ending byte `first`, try to read the rest of
    /// a boundary line.
    ///
    /// Returns the resulting state if it is a boundary line. If not, returns
    /// `None` and the caller must roll back to the mark.
    fn match_boundary_line(
        &mut self,
        first: u8,
    ) -> io::Result<Option<ScanState>> {
        let mut b = self.source.read_byte()?;
        if b'\r' == first {
            if Some(b'\n') != b {
                return Ok(None);
            }
            b = self.source.read_byte()?;
        }

        for &expected in self.boundary {
            if Some(expected) != b {
                return Ok(None);
            }
            b = self.source.read_byte()?;
        }

        let state = if Some(b'-') == b {
            if Some(b'-') != self.source.read_byte()? {
                return Ok(None);
            }

            b = self.skip_lwsp()?;
            // A final boundary with nothing after it at all is fine. This is
            // common for a nested multipart, since the line ending after its
            // final boundary is taken by the enclosing boundary.
            if b.is_none() {
                return Ok(Some(ScanState::FinalBoundary));
            }

            ScanState::FinalBoundary
        } else {
            b = self.skip_lwsp_from(b)?;
            ScanState::Boundary
        };

        match b {
            Some(b'\n') => Ok(Some(state)),
            Some(b'\r') if Some(b'\n') == self.source.read_byte()? => {
                Ok(Some(state))
            }
            _ => Ok(None),
        }
    }

    fn skip_lwsp(&mut self) -> io::Result<Option<u8>> {
        let b = self.source.read_byte()?;
        self.skip_lwsp_from(b)
    }

    fn skip_lwsp_from(&mut self, mut b: Option<u8>) -> io::Result<Option<u8>> {
        while let Some(b' ') | Some(b'\t') = b {
            b = self.source.read_byte()?;
        }
        Ok(b)
    }

    /// Read all remaining content of the part into `dst`.
    pub fn drain_into(&mut self, dst: &mut Vec<u8>) -> io::Result<()> {
        while let Some(b) = self.next_byte()? {
            dst.push(b);
        }
        Ok(())
    }
}

impl<R: BufRead> Read for BoundaryScanner<'_, R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < dst.len() {
            match self.next_byte()? {
                Some(b) => {
                    dst[n] = b;
                    n += 1;
                }
                None => break,
            }
        }

        Ok(n)
    }
}
