use cpwire_codec::Value;
use serde::Serialize;

use crate::cmd::InspectArgs;
use crate::exit::{codec_error, CliResult, SUCCESS};
use crate::json::{to_json, typed_to_json};
use crate::output::{hex_dump, print_json, print_table, OutputFormat};

#[derive(Debug, Serialize, PartialEq)]
struct Node {
    path: String,
    kind: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct InspectOutput {
    size: usize,
    nodes: Vec<Node>,
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = args.message.load()?;
    let value = args
        .message
        .codec()
        .decode(&bytes)
        .map_err(|err| codec_error("decode failed", err))?;

    let mut nodes = Vec::new();
    walk(&value, "$".to_string(), &mut nodes);
    tracing::debug!(size = bytes.len(), nodes = nodes.len(), "inspected message");

    match format {
        OutputFormat::Json => print_json(&InspectOutput {
            size: bytes.len(),
            nodes,
        }),
        OutputFormat::Table => print_table(
            &["PATH", "KIND", "DETAIL"],
            nodes
                .into_iter()
                .map(|node| vec![node.path, node.kind.to_string(), node.detail]),
        ),
        OutputFormat::Pretty => {
            println!("{} bytes", bytes.len());
            for node in nodes {
                println!("{:<24} {:<20} {}", node.path, node.kind, node.detail);
            }
        }
        OutputFormat::Raw => println!("{}", hex_dump(&bytes)),
    }
    Ok(SUCCESS)
}

fn count(n: usize, unit: &str) -> String {
    format!("{n} {unit}")
}

fn walk(value: &Value, path: String, nodes: &mut Vec<Node>) {
    let detail = match value {
        Value::Bytes(bytes) => count(bytes.len(), "bytes"),
        Value::Int32Array(items) => count(items.len(), "elements"),
        Value::Int64Array(items) => count(items.len(), "elements"),
        Value::Float64Array(items) => count(items.len(), "elements"),
        Value::List(items) | Value::ObjectArray(items) => count(items.len(), "items"),
        Value::Map(map) => count(map.len(), "entries"),
        Value::AttributeSet(set) => count(set.len(), "entries"),
        Value::TypedMap(map) => count(map.len(), "entries"),
        scalar => to_json(scalar).to_string(),
    };
    nodes.push(Node {
        path: path.clone(),
        kind: value.kind(),
        detail,
    });

    match value {
        Value::List(items) | Value::ObjectArray(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, format!("{path}[{i}]"), nodes);
            }
        }
        Value::Map(map) => {
            for (key, item) in map.iter() {
                let child = match key.as_str() {
                    Some(name) => format!("{path}.{name}"),
                    None => format!("{path}[{}]", to_json(key)),
                };
                walk(item, child, nodes);
            }
        }
        Value::AttributeSet(set) => {
            for (key, item) in set.iter() {
                walk(item, format!("{path}.{key}"), nodes);
            }
        }
        Value::TypedMap(map) => {
            for (key, item) in map.iter() {
                nodes.push(Node {
                    path: format!("{path}.{key}"),
                    kind: item.kind(),
                    detail: typed_to_json(item).to_string(),
                });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use cpwire_codec::{TypedAttributeMap, TypedValue, ValueMap};

    use super::*;

    #[test]
    fn walks_nested_values() {
        let mut typed = TypedAttributeMap::new();
        typed.insert("a", TypedValue::Int(5));
        let mut map = ValueMap::new();
        map.insert("row", Value::TypedMap(typed));
        map.insert(7, Value::Bytes(vec![1, 2]));
        let value = Value::List(vec![Value::Map(map)]);

        let mut nodes = Vec::new();
        walk(&value, "$".to_string(), &mut nodes);
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, ["$", "$[0]", "$[0].row", "$[0].row.a", "$[0][7]"]);
        assert_eq!(nodes[3].kind, "int");
        assert_eq!(nodes[3].detail, "5");
        assert_eq!(nodes[4].detail, "2 bytes");
    }
}
