use std::collections::HashMap;

use parking_lot::RwLock;

use crate::common::RecordId;
use crate::tuple::{Schema, Tuple, TupleMeta, Value};

use super::transaction::{UndoLink, UndoLog};

/// Maps each RID to the head of its version chain. Owned by the
/// transaction manager; the chain bodies live inside the transactions.
pub struct VersionStore {
    links: RwLock<HashMap<RecordId, UndoLink>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
        }
    }

    pub fn undo_link(&self, rid: RecordId) -> Option<UndoLink> {
        self.links.read().get(&rid).copied()
    }

    pub fn set_undo_link(&self, rid: RecordId, link: Option<UndoLink>) {
        let mut links = self.links.write();
        match link {
            Some(link) => {
                links.insert(rid, link);
            }
            None => {
                links.remove(&rid);
            }
        }
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema of a log's partial tuple, plus the column indices it covers.
pub fn undo_log_schema(schema: &Schema, log: &UndoLog) -> (Schema, Vec<usize>) {
    let attrs: Vec<usize> = log
        .modified_fields
        .iter()
        .enumerate()
        .filter_map(|(i, &modified)| modified.then_some(i))
        .collect();
    (Schema::copy_schema(schema, &attrs), attrs)
}

/// Rebuilds the version of a tuple that the given undo logs describe,
/// applying them front to back onto the base tuple. Returns None when
/// the result is a deleted tuple.
pub fn reconstruct_tuple(
    schema: &Schema,
    base_tuple: &Tuple,
    base_meta: TupleMeta,
    undo_logs: &[UndoLog],
) -> Option<Tuple> {
    if base_meta.is_deleted && undo_logs.is_empty() {
        return None;
    }
    if undo_logs.last().is_some_and(|log| log.is_deleted) {
        return None;
    }

    let mut values = base_tuple.values(schema);
    for log in undo_logs {
        if log.is_deleted {
            for value in values.iter_mut() {
                *value = Value::Null;
            }
        } else {
            let (log_schema, attrs) = undo_log_schema(schema, log);
            for (j, &col) in attrs.iter().enumerate() {
                values[col] = log.tuple.value(&log_schema, j);
            }
        }
    }

    let mut tuple = Tuple::new(&values, schema);
    tuple.set_rid(base_tuple.rid());
    Some(tuple)
}

/// Builds the undo log for a transaction's first write to a tuple.
///
/// `base_tuple` is None when the slot held a tombstone (insert into a
/// deleted tuple); `target_tuple` is None for deletions. The log captures
/// the pre-image of whatever the write changes.
pub fn generate_new_undo_log(
    schema: &Schema,
    base_tuple: Option<&Tuple>,
    target_tuple: Option<&Tuple>,
    ts: u64,
    prev_version: Option<UndoLink>,
) -> UndoLog {
    let column_count = schema.column_count();

    match (base_tuple, target_tuple) {
        // Insert over a tombstone: the previous version is "no tuple".
        (None, _) => UndoLog {
            is_deleted: true,
            modified_fields: vec![false; column_count],
            tuple: Tuple::new(&[], &Schema::new(vec![])),
            ts,
            prev_version,
        },
        // Delete: a full pre-image.
        (Some(base), None) => UndoLog {
            is_deleted: false,
            modified_fields: vec![true; column_count],
            tuple: base.clone(),
            ts,
            prev_version,
        },
        // Update: only the columns that actually change.
        (Some(base), Some(target)) => {
            let base_values = base.values(schema);
            let target_values = target.values(schema);
            let modified_fields: Vec<bool> = base_values
                .iter()
                .zip(&target_values)
                .map(|(b, t)| b != t)
                .collect();

            let attrs: Vec<usize> = modified_fields
                .iter()
                .enumerate()
                .filter_map(|(i, &m)| m.then_some(i))
                .collect();
            let partial_schema = Schema::copy_schema(schema, &attrs);
            let partial_values: Vec<Value> =
                attrs.iter().map(|&i| base_values[i].clone()).collect();

            UndoLog {
                is_deleted: false,
                modified_fields,
                tuple: Tuple::new(&partial_values, &partial_schema),
                ts,
                prev_version,
            }
        }
    }
}

/// Merges a repeated self-write into the transaction's existing
/// top-of-chain log, so the log keeps describing the pre-transaction
/// image. Timestamp and back link never change.
pub fn generate_updated_undo_log(
    schema: &Schema,
    base_tuple: Option<&Tuple>,
    target_tuple: Option<&Tuple>,
    log: &UndoLog,
) -> UndoLog {
    // A delete marker already shadows every column.
    if log.is_deleted {
        return log.clone();
    }
    let Some(base) = base_tuple else {
        return log.clone();
    };

    let base_values = base.values(schema);
    let (old_schema, old_attrs) = undo_log_schema(schema, log);

    let newly_changed: Vec<bool> = match target_tuple {
        // A deletion after updates widens the log to a full pre-image.
        None => vec![true; schema.column_count()],
        Some(target) => {
            let target_values = target.values(schema);
            base_values
                .iter()
                .zip(&target_values)
                .map(|(b, t)| b != t)
                .collect()
        }
    };

    let mut merged_fields = vec![false; schema.column_count()];
    let mut merged_values = Vec::new();
    let mut merged_attrs = Vec::new();
    for i in 0..schema.column_count() {
        let in_old = log.modified_fields[i];
        if in_old || newly_changed[i] {
            merged_fields[i] = true;
            merged_attrs.push(i);
            if in_old {
                // The oldest captured value wins.
                let j = old_attrs.iter().position(|&a| a == i).unwrap();
                merged_values.push(log.tuple.value(&old_schema, j));
            } else {
                merged_values.push(base_values[i].clone());
            }
        }
    }

    let merged_schema = Schema::copy_schema(schema, &merged_attrs);
    UndoLog {
        is_deleted: false,
        modified_fields: merged_fields,
        tuple: Tuple::new(&merged_values, &merged_schema),
        ts: log.ts,
        prev_version: log.prev_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;

    fn schema() -> Schema {
        Schema::builder()
            .column("a", DataType::Integer)
            .column("b", DataType::Integer)
            .column("c", DataType::Integer)
            .build()
    }

    fn row(schema: &Schema, a: i32, b: i32, c: i32) -> Tuple {
        Tuple::new(
            &[Value::Integer(a), Value::Integer(b), Value::Integer(c)],
            schema,
        )
    }

    #[test]
    fn test_new_undo_log_captures_changed_columns() {
        let schema = schema();
        let base = row(&schema, 1, 2, 3);
        let target = row(&schema, 1, 20, 3);

        let log = generate_new_undo_log(&schema, Some(&base), Some(&target), 4, None);
        assert_eq!(log.modified_fields, vec![false, true, false]);
        assert!(!log.is_deleted);
        assert_eq!(log.ts, 4);

        let (log_schema, attrs) = undo_log_schema(&schema, &log);
        assert_eq!(attrs, vec![1]);
        assert_eq!(log.tuple.value(&log_schema, 0), Value::Integer(2));
    }

    #[test]
    fn test_reconstruct_applies_logs_in_order() {
        let schema = schema();
        let base = row(&schema, 10, 20, 30);
        let meta = TupleMeta::new(5, false);

        // Newest first: (b: 2) then (a: 1, b: 9).
        let log1 = generate_new_undo_log(
            &schema,
            Some(&row(&schema, 10, 2, 30)),
            Some(&base),
            4,
            None,
        );
        let log2 = generate_new_undo_log(
            &schema,
            Some(&row(&schema, 1, 9, 30)),
            Some(&row(&schema, 10, 2, 30)),
            2,
            None,
        );

        let rebuilt = reconstruct_tuple(&schema, &base, meta, &[log1, log2]).unwrap();
        assert_eq!(
            rebuilt.values(&schema),
            vec![Value::Integer(1), Value::Integer(9), Value::Integer(30)]
        );
    }

    #[test]
    fn test_reconstruct_delete_marker_hides_tuple() {
        let schema = schema();
        let base = row(&schema, 1, 2, 3);

        let delete_log = generate_new_undo_log(&schema, None, Some(&base), 1, None);
        assert!(delete_log.is_deleted);
        assert!(
            reconstruct_tuple(&schema, &base, TupleMeta::new(5, false), &[delete_log]).is_none()
        );

        // A tombstoned base with no logs is invisible too.
        assert!(reconstruct_tuple(&schema, &base, TupleMeta::new(5, true), &[]).is_none());
    }

    #[test]
    fn test_updated_undo_log_keeps_oldest_values() {
        let schema = schema();
        let original = row(&schema, 1, 2, 3);
        let after_first = row(&schema, 1, 20, 3);
        let after_second = row(&schema, 100, 200, 3);

        let first = generate_new_undo_log(&schema, Some(&original), Some(&after_first), 7, None);
        let merged =
            generate_updated_undo_log(&schema, Some(&after_first), Some(&after_second), &first);

        assert_eq!(merged.modified_fields, vec![true, true, false]);
        assert_eq!(merged.ts, 7);

        let (merged_schema, attrs) = undo_log_schema(&schema, &merged);
        assert_eq!(attrs, vec![0, 1]);
        // Column a was first touched by the second write; its pre-image
        // is the value after the first write. Column b keeps the value
        // captured by the first log.
        assert_eq!(merged.tuple.value(&merged_schema, 0), Value::Integer(1));
        assert_eq!(merged.tuple.value(&merged_schema, 1), Value::Integer(2));
    }

    #[test]
    fn test_version_store_links() {
        use crate::common::{PageId, SlotId};

        let store = VersionStore::new();
        let rid = RecordId::new(PageId::new(1), SlotId::new(2));
        assert_eq!(store.undo_link(rid), None);

        let link = UndoLink {
            prev_txn: crate::common::TXN_START_ID + 1,
            prev_log_idx: 0,
        };
        store.set_undo_link(rid, Some(link));
        assert_eq!(store.undo_link(rid), Some(link));

        store.set_undo_link(rid, None);
        assert_eq!(store.undo_link(rid), None);
    }
}
