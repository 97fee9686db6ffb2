//! Secondary index descriptors stored in the system catalog.

use crate::storage::page::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    BTree,
    /// Catalog-describable but not built or queried by this core (trigram inverted-index
    /// build/query logic is out of scope).
    Trigram,
}

#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub index_type: IndexType,
    pub is_unique: bool,
    pub btree_root: PageId,
}

impl IndexDef {
    /// Serialize index definition to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_str(&mut buf, &self.name);
        write_str(&mut buf, &self.table_name);
        buf.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        for col in &self.columns {
            write_str(&mut buf, col);
        }
        buf.push(match self.index_type {
            IndexType::BTree => 1,
            IndexType::Trigram => 2,
        });
        buf.push(if self.is_unique { 1 } else { 0 });
        buf.extend_from_slice(&self.btree_root.to_le_bytes());
        buf
    }

    /// Deserialize index definition from bytes.
    pub fn deserialize(data: &[u8]) -> Option<(Self, usize)> {
        let mut offset = 0;

        let name = read_str(data, &mut offset)?;
        let table_name = read_str(data, &mut offset)?;

        if data.len() < offset + 2 {
            return None;
        }
        let col_count =
            u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        let mut columns = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            columns.push(read_str(data, &mut offset)?);
        }

        if data.len() < offset + 1 {
            return None;
        }
        let index_type = match data[offset] {
            1 => IndexType::BTree,
            2 => IndexType::Trigram,
            _ => return None,
        };
        offset += 1;

        if data.len() < offset + 1 {
            return None;
        }
        let is_unique = data[offset] != 0;
        offset += 1;

        if data.len() < offset + 8 {
            return None;
        }
        let btree_root = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        offset += 8;

        Some((
            IndexDef {
                name,
                table_name,
                columns,
                index_type,
                is_unique,
                btree_root,
            },
            offset,
        ))
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_str(data: &[u8], offset: &mut usize) -> Option<String> {
    if data.len() < *offset + 2 {
        return None;
    }
    let len = u16::from_le_bytes(data[*offset..*offset + 2].try_into().unwrap()) as usize;
    *offset += 2;
    if data.len() < *offset + len {
        return None;
    }
    let s = String::from_utf8(data[*offset..*offset + len].to_vec()).ok()?;
    *offset += len;
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let idx = IndexDef {
            name: "idx_users_email".to_string(),
            table_name: "users".to_string(),
            columns: vec!["email".to_string()],
            index_type: IndexType::BTree,
            is_unique: true,
            btree_root: 42,
        };
        let bytes = idx.serialize();
        let (idx2, _) = IndexDef::deserialize(&bytes).unwrap();
        assert_eq!(idx2.name, "idx_users_email");
        assert_eq!(idx2.table_name, "users");
        assert_eq!(idx2.columns, vec!["email".to_string()]);
        assert_eq!(idx2.index_type, IndexType::BTree);
        assert!(idx2.is_unique);
        assert_eq!(idx2.btree_root, 42);
    }

    #[test]
    fn test_index_roundtrip_multi_column() {
        let idx = IndexDef {
            name: "idx_orders_customer_date".to_string(),
            table_name: "orders".to_string(),
            columns: vec!["customer_id".to_string(), "placed_at".to_string()],
            index_type: IndexType::BTree,
            is_unique: false,
            btree_root: 7,
        };
        let bytes = idx.serialize();
        let (idx2, _) = IndexDef::deserialize(&bytes).unwrap();
        assert_eq!(idx2.columns.len(), 2);
        assert!(!idx2.is_unique);
    }
}
