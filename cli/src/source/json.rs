//! JSON snapshots: one object per line, or a single array of objects.

use super::SourceError;
use docsync_engine::Snapshot;
use serde_json::{Map, Value};

/// Decode newline-delimited JSON objects or a top-level JSON array.
pub fn decode_json(bytes: &[u8]) -> Result<Snapshot, SourceError> {
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    let rows = if first == Some(&b'[') {
        array_rows(bytes)?
    } else {
        line_rows(bytes)?
    };
    Ok(Snapshot::from_json_rows(rows))
}

fn array_rows(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, SourceError> {
    let items: Vec<Value> =
        serde_json::from_slice(bytes).map_err(|source| SourceError::Json { line: 1, source })?;
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(SourceError::NotAnObject(i + 1)),
        })
        .collect()
}

fn line_rows(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, SourceError> {
    let mut rows = Vec::new();
    for (i, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(Value::Object(map)) => rows.push(map),
            Ok(_) => return Err(SourceError::NotAnObject(i + 1)),
            Err(source) => return Err(SourceError::Json { line: i + 1, source }),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_engine::Cell;

    #[test]
    fn decodes_ndjson_with_blank_lines() {
        let input = b"{\"id\": \"1\", \"score\": 7.5}\n\n{\"id\": \"2\", \"phones\": []}\r\n";
        let snapshot = decode_json(input).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.columns(), ["id", "score", "phones"]);
        let second = snapshot.row(1).unwrap();
        assert_eq!(second.get("score"), &Cell::Null);
        assert_eq!(second.get("phones"), &Cell::List(vec![]));
    }

    #[test]
    fn decodes_json_array() {
        let input = br#"  [{"id": 1}, {"id": 2, "created": "2024-01-01"}]"#;
        let snapshot = decode_json(input).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.row(0).unwrap().get("id"), &Cell::Int(1));
    }

    #[test]
    fn reports_the_failing_line() {
        let input = b"{\"id\": \"1\"}\n{\"id\": \n";
        match decode_json(input) {
            Err(SourceError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a JSON error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_object_rows() {
        assert!(matches!(
            decode_json(b"{\"id\": \"1\"}\n42\n"),
            Err(SourceError::NotAnObject(2))
        ));
        assert!(matches!(
            decode_json(b"[{\"id\": \"1\"}, \"x\"]"),
            Err(SourceError::NotAnObject(2))
        ));
    }

    #[test]
    fn empty_input_is_an_empty_snapshot() {
        assert!(decode_json(b"").unwrap().is_empty());
        assert!(decode_json(b"[]").unwrap().is_empty());
    }
}
