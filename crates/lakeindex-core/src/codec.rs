//! Deserialization of lake objects.
//!
//! Objects are stored with `snake_case` field names. Every object-typed JSON
//! value has its keys renamed to `camelCase` before it is mapped onto the
//! typed views in [`types`](crate::types).

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Parse an object body into `T`, renaming fields to camelCase first.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    let raw: Value = serde_json::from_slice(body)?;
    serde_json::from_value(normalize_field_names(raw))
}

/// Recursively rename object keys from `snake_case` to `camelCase`.
///
/// Arrays and scalars are left as they are; objects nested inside arrays are
/// still renamed.
pub fn normalize_field_names(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let renamed: Map<String, Value> = map
                .into_iter()
                .map(|(key, inner)| (to_camel_case(&key), normalize_field_names(inner)))
                .collect();
            Value::Object(renamed)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_field_names).collect()),
        scalar => scalar,
    }
}

/// `block_hash` → `blockHash`. The first segment is kept verbatim.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, word) in key.split('_').enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_words() {
        assert_eq!(to_camel_case("block_hash"), "blockHash");
        assert_eq!(to_camel_case("receipt_execution_outcomes"), "receiptExecutionOutcomes");
        assert_eq!(to_camel_case("height"), "height");
        assert_eq!(to_camel_case("FunctionCall"), "FunctionCall");
    }

    #[test]
    fn nested_objects_are_renamed() {
        let value = normalize_field_names(json!({
            "block_hash": "x",
            "nested_obj": { "chunk_id": 1 }
        }));
        assert_eq!(value, json!({ "blockHash": "x", "nestedObj": { "chunkId": 1 } }));
    }

    #[test]
    fn arrays_and_scalars_pass_through() {
        let value = normalize_field_names(json!({
            "method_names": ["ft_transfer", "nft_mint"],
            "log_lines": [1, 2, 3],
            "outcomes": [{ "gas_burnt": 10 }]
        }));
        assert_eq!(value["methodNames"], json!(["ft_transfer", "nft_mint"]));
        assert_eq!(value["logLines"], json!([1, 2, 3]));
        assert_eq!(value["outcomes"], json!([{ "gasBurnt": 10 }]));
        assert_eq!(normalize_field_names(json!("some_string")), json!("some_string"));
    }

    #[test]
    fn parse_body_into_typed_view() {
        let body = br#"{
            "shard_id": 0,
            "chunk": null,
            "receipt_execution_outcomes": [],
            "state_changes": [{ "cause": { "receipt_hash": "abc", "type": "receipt_processing" } }]
        }"#;
        let shard: crate::types::Shard = parse_body(body).unwrap();
        assert_eq!(shard.shard_id, 0);
        assert_eq!(shard.state_changes[0]["cause"]["receiptHash"], "abc");
    }

    #[test]
    fn parse_body_rejects_truncated_json() {
        let res: Result<Value, _> = parse_body(br#"{"block_hash": "#);
        assert!(res.is_err());
    }
}
