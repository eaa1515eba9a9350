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

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use log::error;

use mimestruct::support::config::SystemConfig;
use mimestruct::support::sysexits::*;
use mimestruct::{Body, Error, RawPart};

use super::main::{HeadersSubcommand, InputOptions, RewriteSubcommand};

pub(super) fn tree(
    config: SystemConfig,
    cmd: InputOptions,
) -> Result<(), Sysexit> {
    let mut message = open_message(&config, &cmd.input)?;
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    write_tree(&mut stdout, &mut message, 0).map_err(report)?;
    stdout.flush().map_err(|e| report(e.into()))
}

pub(super) fn headers(
    config: SystemConfig,
    cmd: HeadersSubcommand,
) -> Result<(), Sysexit> {
    let message = open_message(&config, &cmd.input.input)?;
    let exclude = cmd.exclude.iter().map(String::as_str).collect::<Vec<_>>();

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    message
        .headers()
        .serialize(&mut stdout, &exclude)
        .and_then(|_| stdout.flush())
        .map_err(|e| report(e.into()))
}

pub(super) fn rewrite(
    config: SystemConfig,
    cmd: RewriteSubcommand,
) -> Result<(), Sysexit> {
    let mut message = open_message(&config, &cmd.input.input)?;
    if cmd.update_headers {
        message.update_headers().map_err(report)?;
    }

    // Buffer the whole output so that nothing is written if the message
    // turns out to be unparseable part way through.
    let mut out = Vec::new();
    message.write_to(&mut out).map_err(report)?;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    stdout
        .write_all(&out)
        .and_then(|_| stdout.flush())
        .map_err(|e| report(e.into()))
}

fn open_message(
    config: &SystemConfig,
    input: &Path,
) -> Result<RawPart, Sysexit> {
    let reader: Box<dyn Read + Send> = if Path::new("-") == input {
        Box::new(io::stdin())
    } else {
        match fs::File::open(input) {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("Failed to open '{}': {}", input.display(), e);
                return Err(if io::ErrorKind::NotFound == e.kind() {
                    EX_NOINPUT
                } else {
                    EX_IOERR
                });
            }
        }
    };

    RawPart::parse(reader, &config.multipart).map_err(report)
}

fn report(e: Error) -> Sysexit {
    error!("{}", e);
    match e {
        Error::Io(ref e) if io::ErrorKind::InvalidData != e.kind() => {
            EX_IOERR
        }
        _ => EX_DATAERR,
    }
}

/// Write one line per part of `part`, indenting by `depth`.
fn write_tree(
    out: &mut impl Write,
    part: &mut RawPart,
    depth: usize,
) -> Result<(), Error> {
    let content_type = part
        .content_type()
        .map_or_else(|| "(no content type)".to_owned(), |ct| ct.to_string());
    write!(out, "{:indent$}{}", "", content_type, indent = depth * 2)?;

    match *part.body_mut() {
        Body::Bytes(ref data) => writeln!(out, " [{} bytes]", data.len())?,
        Body::Multipart(ref mut multipart) => {
            let count = multipart.count()?;
            let preamble = multipart.preamble()?.map_or(0, <[u8]>::len);
            let complete = multipart.is_complete()?;
            writeln!(
                out,
                " [{} part(s), {} byte preamble{}]",
                count,
                preamble,
                if complete { "" } else { ", incomplete" }
            )?;

            for ix in 0..count {
                if let Some(child) = multipart.part_mut(ix)? {
                    write_tree(&mut *out, child, depth + 1)?;
                }
            }
        }
    }

    Ok(())
}
