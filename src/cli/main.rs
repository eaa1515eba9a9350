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
use std::io::Read;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use structopt::StructOpt;

use mimestruct::support::config::SystemConfig;
use mimestruct::support::sysexits::*;

/// Inspect and rewrite MIME messages.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    #[structopt(flatten)]
    common: CommonOptions,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
struct CommonOptions {
    /// TOML file with a `[multipart]` table adjusting parser tolerances.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// log4rs configuration file. By default, warnings and errors are
    /// written to standard error.
    #[structopt(long, parse(from_os_str))]
    log_config: Option<PathBuf>,

    /// Log more detail to standard error. Can be given up to three times.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

#[derive(StructOpt)]
enum Command {
    /// Print the MIME structure of a message.
    ///
    /// Each line shows the content type of one part, indented by its depth,
    /// followed by the size of its body, or for multiparts the number of
    /// parts and the size of the preamble. Multiparts which ended without
    /// their final boundary are marked "incomplete".
    Tree(InputOptions),
    /// Print the top-level headers of a message.
    Headers(HeadersSubcommand),
    /// Parse a message and write it back out to standard output.
    ///
    /// Line endings in the structural parts of the message (headers and
    /// boundaries) are normalised to CRLF. Everything else is copied
    /// verbatim.
    Rewrite(RewriteSubcommand),
}

#[derive(StructOpt)]
pub(super) struct InputOptions {
    /// The message to read. "-" reads from stdin.
    #[structopt(parse(from_os_str), default_value = "-")]
    pub(super) input: PathBuf,
}

#[derive(StructOpt)]
pub(super) struct HeadersSubcommand {
    /// Leave out headers with this name. Can be passed multiple times.
    #[structopt(short, long, number_of_values(1))]
    pub(super) exclude: Vec<String>,

    #[structopt(flatten)]
    pub(super) input: InputOptions,
}

#[derive(StructOpt)]
pub(super) struct RewriteSubcommand {
    /// Rewrite the Content-Type header of every multipart to declare the
    /// boundary actually used.
    #[structopt(long)]
    pub(super) update_headers: bool,

    #[structopt(flatten)]
    pub(super) input: InputOptions,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            }
        });

    init_log(&options.common);
    let config = load_config(options.common.config.as_deref());

    let result = match options.cmd {
        Command::Tree(cmd) => super::inspect::tree(config, cmd),
        Command::Headers(cmd) => super::inspect::headers(config, cmd),
        Command::Rewrite(cmd) => super::inspect::rewrite(config, cmd),
    };

    if let Err(exit) = result {
        exit.exit();
    }
}

fn init_log(common: &CommonOptions) {
    if let Some(ref path) = common.log_config {
        if let Err(e) =
            log4rs::init_file(path, log4rs::file::Deserializers::new())
        {
            eprintln!("Error in log config '{}': {}", path.display(), e);
            EX_CONFIG.exit();
        }
        return;
    }

    let level = match common.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {}", e);
                EX_SOFTWARE.exit();
            }
        }
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            EX_SOFTWARE.exit();
        }
    }
}

fn load_config(path: Option<&Path>) -> SystemConfig {
    let path = match path {
        Some(path) => path,
        None => return SystemConfig::default(),
    };

    let mut toml = Vec::new();
    if let Err(e) =
        fs::File::open(path).and_then(|mut f| f.read_to_end(&mut toml))
    {
        eprintln!("Error reading '{}': {}", path.display(), e);
        EX_CONFIG.exit();
    }

    match toml::from_slice(&toml) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error in config file at '{}': {}", path.display(), e);
            EX_CONFIG.exit()
        }
    }
}
