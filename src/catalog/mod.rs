use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{BrambleError, IndexOid, Result, TableOid};
use crate::index::{IndexMetadata, TableIndex};
use crate::storage::table::TableHeap;
use crate::tuple::Schema;

/// A table registered in the catalog.
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Arc<Schema>,
    pub heap: Arc<TableHeap>,
}

/// An index registered in the catalog.
pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_name: String,
    pub is_primary_key: bool,
    pub index: Arc<TableIndex>,
}

/// In-memory catalog of tables and indexes. Nothing here survives a
/// restart; the engine's persistence story covers pages, not metadata.
pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    next_table_oid: AtomicU32,
    next_index_oid: AtomicU32,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: RwLock<HashMap<String, TableOid>>,
    indexes: RwLock<HashMap<IndexOid, Arc<IndexInfo>>>,
    /// table name -> index oids on that table
    table_index_oids: RwLock<HashMap<String, Vec<IndexOid>>>,
}

impl Catalog {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            next_table_oid: AtomicU32::new(0),
            next_index_oid: AtomicU32::new(0),
            tables: RwLock::new(HashMap::new()),
            table_names: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            table_index_oids: RwLock::new(HashMap::new()),
        }
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    pub fn create_table(&self, name: impl Into<String>, schema: Schema) -> Result<Arc<TableInfo>> {
        let name = name.into();
        if self.table_names.read().contains_key(&name) {
            return Err(BrambleError::Execution(format!(
                "table {name} already exists"
            )));
        }

        let oid = self.next_table_oid.fetch_add(1, Ordering::AcqRel);
        let heap = Arc::new(TableHeap::new(Arc::clone(&self.bpm))?);
        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema: Arc::new(schema),
            heap,
        });

        self.tables.write().insert(oid, Arc::clone(&info));
        self.table_names.write().insert(name, oid);
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.table_names.read().get(name)?;
        self.get_table(oid)
    }

    pub fn create_index(
        &self,
        index_name: impl Into<String>,
        table_name: &str,
        key_attrs: Vec<usize>,
        is_primary_key: bool,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Arc<IndexInfo>> {
        let index_name = index_name.into();
        let table = self
            .get_table_by_name(table_name)
            .ok_or_else(|| BrambleError::TableNotFound(table_name.to_string()))?;

        let key_schema = Arc::new(Schema::copy_schema(&table.schema, &key_attrs));
        let metadata = IndexMetadata {
            name: index_name.clone(),
            table_name: table_name.to_string(),
            key_attrs,
            key_schema,
        };
        let index = Arc::new(TableIndex::new(
            metadata,
            Arc::clone(&self.bpm),
            leaf_max_size,
            internal_max_size,
        )?);

        let oid = self.next_index_oid.fetch_add(1, Ordering::AcqRel);
        let info = Arc::new(IndexInfo {
            oid,
            name: index_name,
            table_name: table_name.to_string(),
            is_primary_key,
            index,
        });

        self.indexes.write().insert(oid, Arc::clone(&info));
        self.table_index_oids
            .write()
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        Ok(info)
    }

    pub fn get_index(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.indexes.read().get(&oid).cloned()
    }

    /// Every index on the given table, primary first.
    pub fn table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let oids = self.table_index_oids.read();
        let indexes = self.indexes.read();
        let mut infos: Vec<Arc<IndexInfo>> = oids
            .get(table_name)
            .into_iter()
            .flatten()
            .filter_map(|oid| indexes.get(oid).cloned())
            .collect();
        infos.sort_by_key(|info| !info.is_primary_key);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use crate::tuple::DataType;
    use tempfile::NamedTempFile;

    fn setup() -> (Catalog, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(64, 2, dm));
        (Catalog::new(bpm), temp)
    }

    fn sample_schema() -> Schema {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("v", DataType::Integer)
            .build()
    }

    #[test]
    fn test_create_and_lookup_table() {
        let (catalog, _temp) = setup();

        let info = catalog.create_table("t1", sample_schema()).unwrap();
        assert_eq!(info.name, "t1");
        assert_eq!(catalog.get_table(info.oid).unwrap().oid, info.oid);
        assert!(catalog.get_table_by_name("t1").is_some());
        assert!(catalog.get_table_by_name("nope").is_none());

        assert!(catalog.create_table("t1", sample_schema()).is_err());
    }

    #[test]
    fn test_create_index_and_listing() {
        let (catalog, _temp) = setup();
        catalog.create_table("t1", sample_schema()).unwrap();

        let secondary = catalog
            .create_index("t1_v", "t1", vec![1], false, 16, 16)
            .unwrap();
        let primary = catalog
            .create_index("t1_pk", "t1", vec![0], true, 16, 16)
            .unwrap();

        let listed = catalog.table_indexes("t1");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].oid, primary.oid);
        assert_eq!(listed[1].oid, secondary.oid);

        assert!(catalog.get_index(primary.oid).is_some());
        assert!(catalog.table_indexes("missing").is_empty());
    }
}
