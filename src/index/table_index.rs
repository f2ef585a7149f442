use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{BrambleError, RecordId, Result};
use crate::tuple::{DataType, Schema, Tuple};

use super::btree_iterator::BTreeIterator;
use super::btree_page::IndexKey;
use super::{BPlusTree, Int64Comparator};

/// Static description of an index: what it is called, which table and
/// columns it covers, and the schema of its key tuples.
pub struct IndexMetadata {
    pub name: String,
    pub table_name: String,
    pub key_attrs: Vec<usize>,
    pub key_schema: Arc<Schema>,
}

/// A B+Tree index over one integer column of a table. Key tuples are
/// encoded to the tree's fixed 8-byte keys by widening to i64.
pub struct TableIndex {
    metadata: IndexMetadata,
    tree: BPlusTree,
}

impl TableIndex {
    pub fn new(
        metadata: IndexMetadata,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        if metadata.key_attrs.len() != 1 {
            return Err(BrambleError::Execution(
                "only single-column index keys are supported".into(),
            ));
        }
        match metadata.key_schema.column(0).data_type() {
            DataType::TinyInt
            | DataType::SmallInt
            | DataType::Integer
            | DataType::BigInt
            | DataType::Timestamp => {}
            other => {
                return Err(BrambleError::Execution(format!(
                    "unsupported index key type {other}"
                )))
            }
        }

        let tree = BPlusTree::new(
            bpm,
            Arc::new(Int64Comparator),
            leaf_max_size,
            internal_max_size,
        )?;
        Ok(Self { metadata, tree })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn table_name(&self) -> &str {
        &self.metadata.table_name
    }

    pub fn key_schema(&self) -> &Arc<Schema> {
        &self.metadata.key_schema
    }

    pub fn key_attrs(&self) -> &[usize] {
        &self.metadata.key_attrs
    }

    /// Inserts `key -> rid`. False means the key already exists.
    pub fn insert_entry(&self, key: &Tuple, rid: RecordId) -> Result<bool> {
        self.tree.insert(&self.encode_key(key), rid)
    }

    /// Removes the entry for `key`. The rid identifies the entry in the
    /// interface, but keys are unique here so it is not consulted.
    pub fn delete_entry(&self, key: &Tuple, _rid: RecordId) -> Result<()> {
        self.tree.remove(&self.encode_key(key))
    }

    /// Point lookup; pushes the match (if any) onto `result`.
    pub fn scan_key(&self, key: &Tuple, result: &mut Vec<RecordId>) -> Result<()> {
        if let Some(rid) = self.tree.get_value(&self.encode_key(key))? {
            result.push(rid);
        }
        Ok(())
    }

    /// Forward iterator over the whole index in key order.
    pub fn iter(&self) -> Result<BTreeIterator> {
        self.tree.iter()
    }

    fn encode_key(&self, key: &Tuple) -> IndexKey {
        let value = key.value(&self.metadata.key_schema, 0);
        value
            .as_i64()
            .expect("index keys must be non-null integers")
            .to_le_bytes()
    }
}
