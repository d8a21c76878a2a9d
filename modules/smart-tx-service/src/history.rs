//! Append-only audit log for smart transaction records.
//!
//! Every mutation of a record is stored as a [`HistoryEntry`]: the list of
//! patch operations turning the previous snapshot into the next one. The
//! first entry is built against an empty object, so replaying the whole
//! history from `{}` reconstructs the current record (minus its history).

use chrono::Utc;
use serde_json::{Map, Value};
use smart_tx_types::{HistoryEntry, PatchOperation, SmartTransaction};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("Invalid patch path '{0}'")]
    InvalidPath(String),
    #[error("Patch path '{0}' does not exist")]
    PathNotFound(String),
}

/// Deep clone of the record with `history` stripped.
pub fn snapshot(record: &SmartTransaction) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or_else(|e| {
        log::error!("[STX_HISTORY] Failed to snapshot {}: {}", record.uuid, e);
        Value::Object(Map::new())
    });
    if let Value::Object(map) = &mut value {
        map.remove("history");
    }
    value
}

/// Patch-set turning `prev` into `next`, stamped with the capture time.
pub fn diff(prev: &Value, next: &Value, note: Option<&str>) -> HistoryEntry {
    let mut operations = Vec::new();
    diff_values(prev, next, "", &mut operations);
    HistoryEntry {
        note: note.map(|n| n.to_string()),
        timestamp: Utc::now().timestamp_millis(),
        operations,
    }
}

/// The first history entry of a record: a full add against an empty object.
pub fn initial_entry(record: &SmartTransaction, note: Option<&str>) -> HistoryEntry {
    diff(&Value::Object(Map::new()), &snapshot(record), note)
}

/// Rebuild a record snapshot by applying every entry from an empty object.
///
/// The stored history is only read; operations are cloned as they are applied.
pub fn replay(history: &[HistoryEntry]) -> Result<Value, HistoryError> {
    let mut doc = Value::Object(Map::new());
    for entry in history {
        for op in &entry.operations {
            apply(&mut doc, op)?;
        }
    }
    Ok(doc)
}

fn diff_values(prev: &Value, next: &Value, path: &str, ops: &mut Vec<PatchOperation>) {
    match (prev, next) {
        (Value::Object(before), Value::Object(after)) => {
            for (key, old) in before {
                let child = child_path(path, key);
                match after.get(key) {
                    Some(new) => diff_values(old, new, &child, ops),
                    None => ops.push(PatchOperation::Remove { path: child }),
                }
            }
            for (key, new) in after {
                if !before.contains_key(key) {
                    ops.push(PatchOperation::Add {
                        path: child_path(path, key),
                        value: new.clone(),
                    });
                }
            }
        }
        _ if prev == next => {}
        // Arrays and scalars are replaced wholesale
        _ => ops.push(PatchOperation::Replace {
            path: path.to_string(),
            value: next.clone(),
        }),
    }
}

fn child_path(parent: &str, key: &str) -> String {
    format!("{}/{}", parent, key.replace('~', "~0").replace('/', "~1"))
}

fn parse_pointer(path: &str) -> Result<Vec<String>, HistoryError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| HistoryError::InvalidPath(path.to_string()))?;
    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Apply one operation in place.
pub fn apply(doc: &mut Value, op: &PatchOperation) -> Result<(), HistoryError> {
    let path = op.path();
    if path.is_empty() {
        match op {
            PatchOperation::Add { value, .. } | PatchOperation::Replace { value, .. } => {
                *doc = value.clone()
            }
            PatchOperation::Remove { .. } => *doc = Value::Null,
        }
        return Ok(());
    }

    let tokens = parse_pointer(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(HistoryError::InvalidPath(path.to_string()));
    };

    let mut target = doc;
    for token in parents {
        target = match target {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
        .ok_or_else(|| HistoryError::PathNotFound(path.to_string()))?;
    }

    match target {
        Value::Object(map) => match op {
            PatchOperation::Add { value, .. } => {
                map.insert(last.clone(), value.clone());
            }
            PatchOperation::Replace { value, .. } => {
                let slot = map
                    .get_mut(last)
                    .ok_or_else(|| HistoryError::PathNotFound(path.to_string()))?;
                *slot = value.clone();
            }
            PatchOperation::Remove { .. } => {
                map.remove(last)
                    .ok_or_else(|| HistoryError::PathNotFound(path.to_string()))?;
            }
        },
        Value::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                last.parse::<usize>()
                    .map_err(|_| HistoryError::InvalidPath(path.to_string()))?
            };
            match op {
                PatchOperation::Add { value, .. } if index <= items.len() => {
                    items.insert(index, value.clone())
                }
                PatchOperation::Replace { value, .. } if index < items.len() => {
                    items[index] = value.clone()
                }
                PatchOperation::Remove { .. } if index < items.len() => {
                    items.remove(index);
                }
                _ => return Err(HistoryError::PathNotFound(path.to_string())),
            }
        }
        _ => return Err(HistoryError::PathNotFound(path.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use smart_tx_types::{SmartTransactionStatus, StatusMetadata, TxParams};

    fn record() -> SmartTransaction {
        SmartTransaction {
            uuid: "uuid-1".to_string(),
            chain_id: Some("0x1".to_string()),
            status: Some(SmartTransactionStatus::Pending),
            tx_params: Some(TxParams {
                from: Some("0xabc".to_string()),
                nonce: Some("0x1".to_string()),
                ..Default::default()
            }),
            time: Some(1_700_000_000_000),
            cancellable: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_strips_history() {
        let mut rec = record();
        rec.history.push(initial_entry(&rec, None));
        let snap = snapshot(&rec);
        assert!(snap.get("history").is_none());
        assert_eq!(snap["uuid"], "uuid-1");
    }

    #[test]
    fn test_initial_entry_is_full_add() {
        let rec = record();
        let entry = initial_entry(&rec, Some("created"));
        assert_eq!(entry.note.as_deref(), Some("created"));
        assert!(entry
            .operations
            .iter()
            .all(|op| matches!(op, PatchOperation::Add { .. })));
        assert_eq!(replay(&[entry]).unwrap(), snapshot(&rec));
    }

    #[test]
    fn test_diff_nested_changes() {
        let prev = json!({"status": "pending", "statusMetadata": {"minedTx": "not_mined"}, "cancellable": true});
        let next = json!({"status": "success", "statusMetadata": {"minedTx": "success", "minedHash": "0xabc"}});
        let entry = diff(&prev, &next, None);
        assert_eq!(
            entry.operations,
            vec![
                PatchOperation::Replace { path: "/status".into(), value: json!("success") },
                PatchOperation::Replace { path: "/statusMetadata/minedTx".into(), value: json!("success") },
                PatchOperation::Add { path: "/statusMetadata/minedHash".into(), value: json!("0xabc") },
                PatchOperation::Remove { path: "/cancellable".into() },
            ]
        );
    }

    #[test]
    fn test_identical_snapshots_produce_empty_patch() {
        let snap = snapshot(&record());
        assert!(diff(&snap, &snap, Some("noop")).operations.is_empty());
    }

    #[test]
    fn test_replay_round_trip_over_updates() {
        let mut rec = record();
        rec.history.push(initial_entry(&rec, None));

        let mut next = rec.clone();
        next.status = Some(SmartTransactionStatus::Success);
        next.cancellable = Some(false);
        next.status_metadata = Some(StatusMetadata {
            mined_hash: Some("0xabc".to_string()),
            ..Default::default()
        });
        next.history.push(diff(&snapshot(&rec), &snapshot(&next), Some("status update")));

        let mut last = next.clone();
        last.confirmed = true;
        last.tx_params = None;
        last.history.push(diff(&snapshot(&next), &snapshot(&last), Some("confirmed")));

        let stored = last.history.clone();
        assert_eq!(replay(&last.history).unwrap(), snapshot(&last));
        assert_eq!(last.history, stored);
    }

    #[test]
    fn test_escaped_keys_round_trip() {
        let prev = json!({});
        let next = json!({"a/b": {"c~d": 1}});
        let entry = diff(&prev, &next, None);
        assert_eq!(entry.operations[0].path(), "/a~1b");
        assert_eq!(replay(&[entry]).unwrap(), next);
    }

    #[test]
    fn test_apply_array_operations() {
        let mut doc = json!({"list": [1, 2]});
        apply(&mut doc, &PatchOperation::Add { path: "/list/-".into(), value: json!(3) }).unwrap();
        apply(&mut doc, &PatchOperation::Remove { path: "/list/0".into() }).unwrap();
        apply(&mut doc, &PatchOperation::Replace { path: "/list/1".into(), value: json!(9) }).unwrap();
        assert_eq!(doc, json!({"list": [2, 9]}));
    }

    #[test]
    fn test_apply_rejects_missing_paths() {
        let mut doc = json!({});
        assert_eq!(
            apply(&mut doc, &PatchOperation::Replace { path: "/missing".into(), value: json!(1) }),
            Err(HistoryError::PathNotFound("/missing".to_string()))
        );
        assert_eq!(
            apply(&mut doc, &PatchOperation::Add { path: "no-slash".into(), value: json!(1) }),
            Err(HistoryError::InvalidPath("no-slash".to_string()))
        );
    }
}
