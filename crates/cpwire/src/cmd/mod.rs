use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use cpwire_codec::{CodecConfig, ExtendedCodec, DEFAULT_MAX_DEPTH};

use crate::exit::{io_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod inspect;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a JSON-notated value into a message.
    Encode(EncodeArgs),
    /// Decode a message and print its value.
    Decode(DecodeArgs),
    /// List every value in a message with its path and kind.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Value in JSON notation. Read from stdin when neither --json nor --file is given.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the JSON value from a file.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// Encode with the standard codec only.
    #[arg(long)]
    pub standard: bool,
}

/// Where message bytes come from.
#[derive(Args, Debug)]
pub struct MessageArgs {
    /// Message as hex. Read from stdin when neither --hex nor --file is given.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read the message from a file.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
    /// File or stdin holds hex text instead of raw bytes.
    #[arg(long)]
    pub hex_input: bool,
    /// Deepest nesting accepted while decoding.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,
}

impl MessageArgs {
    pub fn load(&self) -> CliResult<Vec<u8>> {
        if let Some(text) = &self.hex {
            return parse_hex(text);
        }
        let bytes = read_source(self.file.as_deref())?;
        if !self.hex_input {
            return Ok(bytes);
        }
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| CliError::usage("--hex-input expects hex text"))?;
        parse_hex(text)
    }

    pub fn codec(&self) -> ExtendedCodec {
        ExtendedCodec::with_config(CodecConfig {
            max_depth: self.max_depth,
        })
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub message: MessageArgs,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub message: MessageArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Read all of `path`, or stdin when no path is given.
pub fn read_source(path: Option<&Path>) -> CliResult<Vec<u8>> {
    match path {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err)),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            Ok(buf)
        }
    }
}

/// Hex text to bytes. Whitespace is ignored.
pub fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|err| CliError::usage(format!("invalid hex input: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_ignores_whitespace() {
        assert_eq!(parse_hex("0c 02\n01 02").unwrap(), vec![12, 2, 1, 2]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn bad_hex_is_usage_error() {
        let err = parse_hex("0g").unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
