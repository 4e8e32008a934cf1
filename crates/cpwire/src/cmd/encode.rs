use cpwire_codec::{ExtendedCodec, StandardCodec, Value};
use serde::Serialize;

use crate::cmd::{read_source, EncodeArgs};
use crate::exit::{codec_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::json::from_json;
use crate::output::{hex_dump, print_json, print_json_pretty, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput<'a> {
    kind: &'a str,
    size: usize,
    hex: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let value = read_value(&args)?;
    let bytes = if args.standard {
        StandardCodec::new().encode(&value)
    } else {
        ExtendedCodec::new().encode(&value)
    }
    .map_err(|err| codec_error("encode failed", err))?;
    tracing::debug!(kind = value.kind(), size = bytes.len(), "encoded message");

    match format {
        OutputFormat::Raw => print_raw(&bytes),
        OutputFormat::Json => print_json(&EncodeOutput {
            kind: value.kind(),
            size: bytes.len(),
            hex: hex::encode(&bytes),
        }),
        OutputFormat::Table => print_table(
            &["KIND", "SIZE", "HEX"],
            [vec![
                value.kind().to_string(),
                bytes.len().to_string(),
                hex::encode(&bytes),
            ]],
        ),
        OutputFormat::Pretty => {
            print_json_pretty(&crate::json::to_json(&value));
            println!("{} bytes", bytes.len());
            if !bytes.is_empty() {
                println!("{}", hex_dump(&bytes));
            }
        }
    }
    Ok(SUCCESS)
}

fn read_value(args: &EncodeArgs) -> CliResult<Value> {
    let text = match &args.json {
        Some(text) => text.clone(),
        None => String::from_utf8(read_source(args.file.as_deref())?)
            .map_err(|_| CliError::new(USAGE, "JSON input is not UTF-8"))?,
    };
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("input is not valid JSON: {err}")))?;
    from_json(&json).map_err(|err| CliError::new(DATA_INVALID, format!("invalid value: {err}")))
}
