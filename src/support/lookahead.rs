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

//! A forward-only byte source with bounded rollback.
//!
//! The multipart boundary scanner needs to look a little way past a line
//! ending before it knows whether it is looking at a boundary or at content,
//! and must be able to put those bytes back if it was content. Rather than
//! relying on a reader's mark/reset contract, `Lookahead` records the bytes
//! consumed since the mark itself and replays them after a rollback. The
//! recording is capped at the limit given to `mark()`; exceeding it
//! invalidates the mark, and rolling back to an invalid mark is an error.

use std::collections::VecDeque;
use std::io::{self, BufRead};

#[derive(Debug)]
pub struct Lookahead<R> {
    inner: R,
    /// Bytes put back by `reset()`, served before anything from `inner`.
    replay: VecDeque<u8>,
    /// Bytes consumed since the last `mark()`. Only meaningful while
    /// `marked`; kept between marks so its allocation is reused.
    recorded: Vec<u8>,
    /// Whether there is a valid mark.
    marked: bool,
    /// Set when a mark was invalidated by reading past its limit.
    overrun: bool,
    mark_limit: usize,
}

impl<R: BufRead> Lookahead<R> {
    pub fn new(inner: R) -> Self {
        Lookahead {
            inner,
            replay: VecDeque::new(),
            recorded: Vec::new(),
            marked: false,
            overrun: false,
            mark_limit: 0,
        }
    }

    /// Read the next byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.replay.pop_front() {
            Some(b) => b,
            None => {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    return Ok(None);
                }

                let b = buf[0];
                self.inner.consume(1);
                b
            }
        };

        if self.marked {
            if self.recorded.len() < self.mark_limit {
                self.recorded.push(byte);
            } else {
                self.marked = false;
                self.overrun = true;
            }
        }

        Ok(Some(byte))
    }

    /// Return the next byte without consuming it.
    pub fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(&b) = self.replay.front() {
            return Ok(Some(b));
        }

        let buf = self.inner.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }

        let b = buf[0];
        self.inner.consume(1);
        self.replay.push_back(b);
        Ok(Some(b))
    }

    /// Mark the current position, allowing up to `limit` bytes to be read
    /// before the mark becomes invalid.
    ///
    /// Any previous mark is discarded.
    pub fn mark(&mut self, limit: usize) {
        self.mark_limit = limit;
        self.overrun = false;
        self.marked = true;
        self.recorded.clear();
    }

    /// Forget the current mark, committing to everything read since.
    pub fn unmark(&mut self) {
        self.marked = false;
        self.overrun = false;
    }

    /// Roll back to the marked position.
    ///
    /// The mark is consumed. Fails if no mark is set or if more bytes than
    /// the mark limit were read since it was set.
    pub fn reset(&mut self) -> io::Result<()> {
        if self.marked {
            self.marked = false;
            for &b in self.recorded.iter().rev() {
                self.replay.push_front(b);
            }
            return Ok(());
        }

        if self.overrun {
            self.overrun = false;
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "lookahead exceeded mark limit of {} bytes",
                    self.mark_limit
                ),
            ))
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "reset without mark",
            ))
        }
    }

    /// Read one line, returning it without its terminator.
    ///
    /// A line ends at LF, CRLF, or a CR not followed by LF. Returns `None` at
    /// end of stream if nothing at all was read.
    pub fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut saw_anything = false;

        while let Some(b) = self.read_byte()? {
            saw_anything = true;
            match b {
                b'\n' => break,
                b'\r' => {
                    if Some(b'\n') == self.peek_byte()? {
                        self.read_byte()?;
                    }
                    break;
                }
                b => line.push(b),
            }
        }

        Ok(if saw_anything { Some(line) } else { None })
    }
}
