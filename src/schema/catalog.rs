//! System catalog: stores table, index, and foreign-key definitions.
//!
//! The catalog is itself a B+tree with well-known keys:
//!   "table:<name>" -> serialized TableDef
//!   "index:<name>" -> serialized IndexDef
//!   "fk:<name>"    -> serialized ForeignKeyDef
//!
//! Operates against any `PageStore`, so the same catalog code runs whether the caller is a
//! write transaction's dirty buffer or (for reads) a registered reader's WAL-index overlay.
//! Bumping the header's `schema_cookie` on a successful DDL call is the caller's job (the
//! pager that owns the cookie isn't reachable from here).

use crate::btree::ops::BTree;
use crate::error::{DecentError, Result};
use crate::schema::column::ColumnDef;
use crate::schema::fk::ForeignKeyDef;
use crate::schema::index::IndexDef;
use crate::storage::page::PageId;
use crate::storage::page_store::PageStore;

/// Table definition.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub pk_column: Option<String>,
    pub data_btree_root: PageId,
}

impl TableDef {
    /// Serialize table definition.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let name_bytes = self.name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        buf.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        for col in &self.columns {
            let col_bytes = col.serialize();
            buf.extend_from_slice(&(col_bytes.len() as u16).to_le_bytes());
            buf.extend_from_slice(&col_bytes);
        }
        match &self.pk_column {
            Some(pk) => {
                buf.push(1);
                let pk_bytes = pk.as_bytes();
                buf.extend_from_slice(&(pk_bytes.len() as u16).to_le_bytes());
                buf.extend_from_slice(pk_bytes);
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.data_btree_root.to_le_bytes());
        buf
    }

    /// Deserialize table definition.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        let mut offset = 0;

        if data.len() < offset + 2 {
            return None;
        }
        let name_len = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        let name = String::from_utf8(data[offset..offset + name_len].to_vec()).ok()?;
        offset += name_len;

        if data.len() < offset + 2 {
            return None;
        }
        let col_count = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;

        let mut columns = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            if data.len() < offset + 2 {
                return None;
            }
            let col_bytes_len =
                u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
            offset += 2;
            let (col, _) = ColumnDef::deserialize(&data[offset..offset + col_bytes_len])?;
            columns.push(col);
            offset += col_bytes_len;
        }

        if data.len() < offset + 1 {
            return None;
        }
        let has_pk = data[offset];
        offset += 1;
        let pk_column = if has_pk == 1 {
            if data.len() < offset + 2 {
                return None;
            }
            let pk_len = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
            offset += 2;
            let pk = String::from_utf8(data[offset..offset + pk_len].to_vec()).ok()?;
            offset += pk_len;
            Some(pk)
        } else {
            None
        };

        if data.len() < offset + 8 {
            return None;
        }
        let data_btree_root = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());

        Some(TableDef {
            name,
            columns,
            pk_column,
            data_btree_root,
        })
    }

    /// Find column index by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get PK column index.
    pub fn pk_column_index(&self) -> Option<usize> {
        self.pk_column.as_ref().and_then(|pk| self.column_index(pk))
    }
}

/// System catalog managing table, index, and foreign-key definitions.
pub struct SystemCatalog {
    catalog_btree: BTree,
}

impl SystemCatalog {
    /// Create a new system catalog with a fresh B+tree.
    pub fn create(store: &mut impl PageStore) -> Result<Self> {
        let catalog_btree = BTree::create(store)?;
        Ok(SystemCatalog { catalog_btree })
    }

    /// Open an existing system catalog.
    pub fn open(catalog_root: PageId) -> Self {
        SystemCatalog {
            catalog_btree: BTree::open(catalog_root),
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.catalog_btree.root_page_id()
    }

    /// Create a table. Returns the table definition with the allocated B+tree root.
    pub fn create_table(
        &mut self,
        store: &mut impl PageStore,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> Result<TableDef> {
        let key = format!("table:{}", name);
        if self.catalog_btree.search(store, key.as_bytes())?.is_some() {
            return Err(DecentError::Schema(format!("table '{}' already exists", name)));
        }

        let pk_column = columns.iter().find(|c| c.is_primary_key).map(|c| c.name.clone());

        let data_btree = BTree::create(store)?;
        let data_btree_root = data_btree.root_page_id();

        let table_def = TableDef {
            name: name.to_string(),
            columns,
            pk_column,
            data_btree_root,
        };

        let serialized = table_def.serialize();
        self.catalog_btree.insert(store, key.as_bytes(), &serialized)?;

        Ok(table_def)
    }

    /// Drop a table's catalog entry. Does not reclaim the table's data pages (left to the
    /// caller, which has the allocation/free machinery this module doesn't touch).
    pub fn drop_table(&mut self, store: &mut impl PageStore, name: &str) -> Result<TableDef> {
        let key = format!("table:{}", name);
        let existing = self
            .catalog_btree
            .search(store, key.as_bytes())?
            .and_then(|data| TableDef::deserialize(&data))
            .ok_or_else(|| DecentError::Schema(format!("table '{}' does not exist", name)))?;
        self.catalog_btree.delete(store, key.as_bytes())?;
        Ok(existing)
    }

    /// Get a table definition by name.
    pub fn get_table(&self, store: &mut impl PageStore, name: &str) -> Result<Option<TableDef>> {
        let key = format!("table:{}", name);
        match self.catalog_btree.search(store, key.as_bytes())? {
            Some(data) => Ok(TableDef::deserialize(&data)),
            None => Ok(None),
        }
    }

    /// Update a table definition in place (e.g. after a root page changes).
    pub fn update_table(&mut self, store: &mut impl PageStore, table_def: &TableDef) -> Result<()> {
        let key = format!("table:{}", table_def.name);
        let serialized = table_def.serialize();
        self.catalog_btree.insert(store, key.as_bytes(), &serialized)?;
        Ok(())
    }

    /// Create an index definition and store it in the catalog.
    pub fn create_index(
        &mut self,
        store: &mut impl PageStore,
        index_def: IndexDef,
    ) -> Result<IndexDef> {
        let key = format!("index:{}", index_def.name);
        if self.catalog_btree.search(store, key.as_bytes())?.is_some() {
            return Err(DecentError::Schema(format!(
                "index '{}' already exists",
                index_def.name
            )));
        }
        let serialized = index_def.serialize();
        self.catalog_btree.insert(store, key.as_bytes(), &serialized)?;
        Ok(index_def)
    }

    /// Drop an index's catalog entry.
    pub fn drop_index(&mut self, store: &mut impl PageStore, name: &str) -> Result<IndexDef> {
        let key = format!("index:{}", name);
        let existing = self
            .catalog_btree
            .search(store, key.as_bytes())?
            .and_then(|data| IndexDef::deserialize(&data).map(|(idx, _)| idx))
            .ok_or_else(|| DecentError::Schema(format!("index '{}' does not exist", name)))?;
        self.catalog_btree.delete(store, key.as_bytes())?;
        Ok(existing)
    }

    /// Get an index definition by name.
    pub fn get_index(&self, store: &mut impl PageStore, name: &str) -> Result<Option<IndexDef>> {
        let key = format!("index:{}", name);
        match self.catalog_btree.search(store, key.as_bytes())? {
            Some(data) => Ok(IndexDef::deserialize(&data).map(|(idx, _)| idx)),
            None => Ok(None),
        }
    }

    /// Get all indexes for a table.
    pub fn get_indexes_for_table(
        &self,
        store: &mut impl PageStore,
        table_name: &str,
    ) -> Result<Vec<IndexDef>> {
        let mut indexes = Vec::new();
        self.catalog_btree.scan(store, |k, v| {
            if let Ok(key_str) = std::str::from_utf8(k) {
                if key_str.starts_with("index:") {
                    if let Some((idx, _)) = IndexDef::deserialize(v) {
                        if idx.table_name == table_name {
                            indexes.push(idx);
                        }
                    }
                }
            }
            Ok(true)
        })?;
        Ok(indexes)
    }

    /// Create a foreign-key definition and store it in the catalog.
    pub fn create_foreign_key(
        &mut self,
        store: &mut impl PageStore,
        fk: ForeignKeyDef,
    ) -> Result<ForeignKeyDef> {
        let key = format!("fk:{}", fk.name);
        if self.catalog_btree.search(store, key.as_bytes())?.is_some() {
            return Err(DecentError::Schema(format!(
                "foreign key '{}' already exists",
                fk.name
            )));
        }
        let serialized = fk.serialize();
        self.catalog_btree.insert(store, key.as_bytes(), &serialized)?;
        Ok(fk)
    }

    /// Get all foreign keys whose child table is `table_name`.
    pub fn get_foreign_keys_for_table(
        &self,
        store: &mut impl PageStore,
        table_name: &str,
    ) -> Result<Vec<ForeignKeyDef>> {
        let mut fks = Vec::new();
        self.catalog_btree.scan(store, |k, v| {
            if let Ok(key_str) = std::str::from_utf8(k) {
                if key_str.starts_with("fk:") {
                    if let Some((fk, _)) = ForeignKeyDef::deserialize(v) {
                        if fk.child_table == table_name {
                            fks.push(fk);
                        }
                    }
                }
            }
            Ok(true)
        })?;
        Ok(fks)
    }

    /// List all table names.
    pub fn list_tables(&self, store: &mut impl PageStore) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        self.catalog_btree.scan(store, |k, _v| {
            if let Ok(key_str) = std::str::from_utf8(k) {
                if let Some(name) = key_str.strip_prefix("table:") {
                    tables.push(name.to_string());
                }
            }
            Ok(true)
        })?;
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fk::FkAction;
    use crate::schema::index::IndexType;
    use crate::storage::page::DEFAULT_PAGE_SIZE;
    use crate::storage::pager::Pager;
    use crate::tx::transaction::Writer;
    use crate::tx::TxPageStore;
    use crate::types::DataType;
    use crate::vfs::OsVfs;
    use tempfile::TempDir;

    fn open_pager(dir: &TempDir) -> Pager<OsVfs> {
        let vfs = OsVfs::new();
        let db_path = dir.path().join("test.db");
        Pager::create(&vfs, &db_path, DEFAULT_PAGE_SIZE, 16).unwrap()
    }

    #[test]
    fn test_table_def_roundtrip() {
        let table = TableDef {
            name: "users".to_string(),
            columns: vec![
                ColumnDef::new("id", DataType::Int64).primary_key(),
                ColumnDef::new("name", DataType::Text),
                ColumnDef::new("data", DataType::Blob),
            ],
            pk_column: Some("id".to_string()),
            data_btree_root: 42,
        };

        let bytes = table.serialize();
        let table2 = TableDef::deserialize(&bytes).unwrap();
        assert_eq!(table2.name, "users");
        assert_eq!(table2.columns.len(), 3);
        assert_eq!(table2.pk_column, Some("id".to_string()));
        assert_eq!(table2.data_btree_root, 42);
    }

    #[test]
    fn test_catalog_create_and_get_table() {
        let dir = TempDir::new().unwrap();
        let mut pager = open_pager(&dir);
        let mut writer = Writer::begin(1, 0);
        let mut store = TxPageStore::new(&mut writer, &mut pager);
        let mut catalog = SystemCatalog::create(&mut store).unwrap();

        let columns = vec![
            ColumnDef::new("id", DataType::Int64).primary_key(),
            ColumnDef::new("body", DataType::Text),
        ];

        let table_def = catalog.create_table(&mut store, "posts", columns).unwrap();
        assert_eq!(table_def.name, "posts");
        assert_eq!(table_def.pk_column, Some("id".to_string()));

        let retrieved = catalog.get_table(&mut store, "posts").unwrap().unwrap();
        assert_eq!(retrieved.name, "posts");
        assert_eq!(retrieved.columns.len(), 2);
    }

    #[test]
    fn test_catalog_duplicate_table() {
        let dir = TempDir::new().unwrap();
        let mut pager = open_pager(&dir);
        let mut writer = Writer::begin(1, 0);
        let mut store = TxPageStore::new(&mut writer, &mut pager);
        let mut catalog = SystemCatalog::create(&mut store).unwrap();

        let columns = vec![ColumnDef::new("id", DataType::Int64).primary_key()];
        catalog.create_table(&mut store, "t", columns.clone()).unwrap();
        assert!(catalog.create_table(&mut store, "t", columns).is_err());
    }

    #[test]
    fn test_catalog_drop_table() {
        let dir = TempDir::new().unwrap();
        let mut pager = open_pager(&dir);
        let mut writer = Writer::begin(1, 0);
        let mut store = TxPageStore::new(&mut writer, &mut pager);
        let mut catalog = SystemCatalog::create(&mut store).unwrap();

        let columns = vec![ColumnDef::new("id", DataType::Int64).primary_key()];
        catalog.create_table(&mut store, "t", columns).unwrap();
        catalog.drop_table(&mut store, "t").unwrap();
        assert!(catalog.get_table(&mut store, "t").unwrap().is_none());
        assert!(catalog.drop_table(&mut store, "t").is_err());
    }

    #[test]
    fn test_catalog_indexes() {
        let dir = TempDir::new().unwrap();
        let mut pager = open_pager(&dir);
        let mut writer = Writer::begin(1, 0);
        let mut store = TxPageStore::new(&mut writer, &mut pager);
        let mut catalog = SystemCatalog::create(&mut store).unwrap();

        let idx = IndexDef {
            name: "idx_t_col".to_string(),
            table_name: "t".to_string(),
            columns: vec!["col".to_string()],
            index_type: IndexType::BTree,
            is_unique: true,
            btree_root: 99,
        };

        catalog.create_index(&mut store, idx).unwrap();

        let retrieved = catalog.get_index(&mut store, "idx_t_col").unwrap().unwrap();
        assert_eq!(retrieved.columns, vec!["col".to_string()]);
        assert!(retrieved.is_unique);

        let indexes = catalog.get_indexes_for_table(&mut store, "t").unwrap();
        assert_eq!(indexes.len(), 1);

        catalog.drop_index(&mut store, "idx_t_col").unwrap();
        assert!(catalog.get_index(&mut store, "idx_t_col").unwrap().is_none());
    }

    #[test]
    fn test_catalog_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let mut pager = open_pager(&dir);
        let mut writer = Writer::begin(1, 0);
        let mut store = TxPageStore::new(&mut writer, &mut pager);
        let mut catalog = SystemCatalog::create(&mut store).unwrap();

        let fk = ForeignKeyDef {
            name: "fk_orders_customer".to_string(),
            child_table: "orders".to_string(),
            child_columns: vec!["customer_id".to_string()],
            parent_table: "customers".to_string(),
            parent_columns: vec!["id".to_string()],
            on_delete: FkAction::Restrict,
        };
        catalog.create_foreign_key(&mut store, fk).unwrap();

        let fks = catalog.get_foreign_keys_for_table(&mut store, "orders").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].parent_table, "customers");
    }

    #[test]
    fn test_catalog_persistence() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let vfs = OsVfs::new();

        let catalog_root;
        {
            let mut pager = Pager::create(&vfs, &db_path, DEFAULT_PAGE_SIZE, 16).unwrap();
            let mut writer = Writer::begin(1, 0);
            let mut store = TxPageStore::new(&mut writer, &mut pager);
            let mut catalog = SystemCatalog::create(&mut store).unwrap();

            let columns = vec![
                ColumnDef::new("id", DataType::Int64).primary_key(),
                ColumnDef::new("name", DataType::Text),
            ];
            catalog.create_table(&mut store, "users", columns).unwrap();
            catalog_root = catalog.root_page_id();
            drop(store);
            pager.set_catalog_root(catalog_root);
            pager.flush_header().unwrap();
            pager.sync().unwrap();
        }

        {
            let mut pager = Pager::open(&vfs, &db_path, 16).unwrap();
            let catalog = SystemCatalog::open(catalog_root);
            let mut writer = Writer::begin(2, 0);
            let mut store = TxPageStore::new(&mut writer, &mut pager);

            let table = catalog.get_table(&mut store, "users").unwrap().unwrap();
            assert_eq!(table.name, "users");
            assert_eq!(table.columns.len(), 2);
        }
    }
}
