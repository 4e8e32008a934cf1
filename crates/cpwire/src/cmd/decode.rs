use cpwire_codec::Value;

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, CliResult, SUCCESS};
use crate::json::{to_json, typed_to_json};
use crate::output::{print_json, print_json_pretty, print_table, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = args.message.load()?;
    let value = args
        .message
        .codec()
        .decode(&bytes)
        .map_err(|err| codec_error("decode failed", err))?;
    tracing::debug!(kind = value.kind(), size = bytes.len(), "decoded message");

    match format {
        OutputFormat::Json => print_json(&to_json(&value)),
        OutputFormat::Pretty => print_json_pretty(&to_json(&value)),
        OutputFormat::Table => print_table(&["KEY", "KIND", "VALUE"], rows(&value)),
        OutputFormat::Raw => print!("{}", to_json(&value)),
    }
    Ok(SUCCESS)
}

/// One row per top-level entry of a container, or one row for a scalar.
fn rows(value: &Value) -> Vec<Vec<String>> {
    let row = |key: String, kind: &str, json: serde_json::Value| {
        vec![key, kind.to_string(), json.to_string()]
    };
    match value {
        Value::List(items) | Value::ObjectArray(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| row(i.to_string(), item.kind(), to_json(item)))
            .collect(),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| row(to_json(k).to_string(), v.kind(), to_json(v)))
            .collect(),
        Value::TypedMap(map) => map
            .iter()
            .map(|(k, v)| row(k.clone(), v.kind(), typed_to_json(v)))
            .collect(),
        other => vec![row(String::new(), other.kind(), to_json(other))],
    }
}

#[cfg(test)]
mod tests {
    use cpwire_codec::{TypedAttributeMap, TypedValue, ValueMap};

    use super::*;

    #[test]
    fn list_rows_are_indexed() {
        let rows = rows(&Value::List(vec![Value::from("a"), Value::Int64(2)]));
        assert_eq!(rows[0], vec!["0", "string", "\"a\""]);
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[1][2], r#"{"$i64":2}"#);
    }

    #[test]
    fn map_and_typed_rows() {
        let mut map = ValueMap::new();
        map.insert("k", true);
        assert_eq!(rows(&Value::Map(map))[0], vec!["\"k\"", "bool", "true"]);

        let mut typed = TypedAttributeMap::new();
        typed.insert("n", TypedValue::Short(3));
        let rows = rows(&Value::TypedMap(typed));
        assert_eq!(rows[0][0], "n");
        assert_eq!(rows[0][2], r#"{"$short":3}"#);
    }
}
