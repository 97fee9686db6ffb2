//! Foreign-key descriptors stored in the system catalog.
//!
//! Enforcement itself lives with the executor/statement layer above this core; this module
//! only defines the descriptor shape and its catalog serialization.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAction {
    Restrict,
    NoAction,
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDef {
    pub name: String,
    pub child_table: String,
    pub child_columns: Vec<String>,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    pub on_delete: FkAction,
}

impl ForeignKeyDef {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_str(&mut buf, &self.name);
        write_str(&mut buf, &self.child_table);
        write_str_list(&mut buf, &self.child_columns);
        write_str(&mut buf, &self.parent_table);
        write_str_list(&mut buf, &self.parent_columns);
        buf.push(match self.on_delete {
            FkAction::Restrict => 1,
            FkAction::NoAction => 2,
        });
        buf
    }

    pub fn deserialize(data: &[u8]) -> Option<(Self, usize)> {
        let mut offset = 0;
        let name = read_str(data, &mut offset)?;
        let child_table = read_str(data, &mut offset)?;
        let child_columns = read_str_list(data, &mut offset)?;
        let parent_table = read_str(data, &mut offset)?;
        let parent_columns = read_str_list(data, &mut offset)?;

        if data.len() < offset + 1 {
            return None;
        }
        let on_delete = match data[offset] {
            1 => FkAction::Restrict,
            2 => FkAction::NoAction,
            _ => return None,
        };
        offset += 1;

        Some((
            ForeignKeyDef {
                name,
                child_table,
                child_columns,
                parent_table,
                parent_columns,
                on_delete,
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

fn write_str_list(buf: &mut Vec<u8>, items: &[String]) {
    buf.extend_from_slice(&(items.len() as u16).to_le_bytes());
    for item in items {
        write_str(buf, item);
    }
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

fn read_str_list(data: &[u8], offset: &mut usize) -> Option<Vec<String>> {
    if data.len() < *offset + 2 {
        return None;
    }
    let count = u16::from_le_bytes(data[*offset..*offset + 2].try_into().unwrap()) as usize;
    *offset += 2;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read_str(data, offset)?);
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fk_roundtrip() {
        let fk = ForeignKeyDef {
            name: "fk_orders_customer".to_string(),
            child_table: "orders".to_string(),
            child_columns: vec!["customer_id".to_string()],
            parent_table: "customers".to_string(),
            parent_columns: vec!["id".to_string()],
            on_delete: FkAction::Restrict,
        };
        let bytes = fk.serialize();
        let (fk2, _) = ForeignKeyDef::deserialize(&bytes).unwrap();
        assert_eq!(fk2.name, "fk_orders_customer");
        assert_eq!(fk2.child_table, "orders");
        assert_eq!(fk2.child_columns, vec!["customer_id".to_string()]);
        assert_eq!(fk2.parent_table, "customers");
        assert_eq!(fk2.on_delete, FkAction::Restrict);
    }

    #[test]
    fn test_fk_roundtrip_no_action_composite_key() {
        let fk = ForeignKeyDef {
            name: "fk_line_items_order".to_string(),
            child_table: "line_items".to_string(),
            child_columns: vec!["order_id".to_string(), "order_region".to_string()],
            parent_table: "orders".to_string(),
            parent_columns: vec!["id".to_string(), "region".to_string()],
            on_delete: FkAction::NoAction,
        };
        let bytes = fk.serialize();
        let (fk2, _) = ForeignKeyDef::deserialize(&bytes).unwrap();
        assert_eq!(fk2.child_columns.len(), 2);
        assert_eq!(fk2.on_delete, FkAction::NoAction);
    }
}
