//! Column definitions: the catalog's unit of per-field metadata, serialized into the table
//! descriptor record stored in the system catalog B+tree.

use crate::types::DataType;

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_nullable: bool,
    pub default_value: Option<DefaultValue>,
}

/// Simple default values that can be serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Int64(i64),
    Bool(bool),
    Float64(f64),
    Text(String),
    Null,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: DataType) -> Self {
        ColumnDef {
            name: name.to_string(),
            data_type,
            is_primary_key: false,
            is_unique: false,
            is_nullable: true,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default_value = Some(default);
        self
    }

    /// Serialize column definition to bytes.
    /// Format: [name_len(u16)][name][type_tag(u8)][flags(u8)][default_tag(u8)][default_data...]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let name_bytes = self.name.as_bytes();
        buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        buf.push(self.data_type.tag());

        let mut flags: u8 = 0;
        if self.is_primary_key {
            flags |= 0x01;
        }
        if self.is_unique {
            flags |= 0x02;
        }
        if self.is_nullable {
            flags |= 0x04;
        }
        buf.push(flags);

        match &self.default_value {
            None => buf.push(0),
            Some(DefaultValue::Null) => buf.push(1),
            Some(DefaultValue::Int64(n)) => {
                buf.push(2);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Some(DefaultValue::Bool(b)) => {
                buf.push(3);
                buf.push(if *b { 1 } else { 0 });
            }
            Some(DefaultValue::Float64(n)) => {
                buf.push(4);
                buf.extend_from_slice(&n.to_le_bytes());
            }
            Some(DefaultValue::Text(s)) => {
                buf.push(5);
                let s_bytes = s.as_bytes();
                buf.extend_from_slice(&(s_bytes.len() as u16).to_le_bytes());
                buf.extend_from_slice(s_bytes);
            }
        }
        buf
    }

    /// Deserialize column definition from bytes. Returns (ColumnDef, bytes_consumed).
    pub fn deserialize(data: &[u8]) -> Option<(Self, usize)> {
        if data.len() < 2 {
            return None;
        }
        let name_len = u16::from_le_bytes(data[0..2].try_into().unwrap()) as usize;
        if data.len() < 2 + name_len + 2 {
            return None;
        }
        let name = String::from_utf8(data[2..2 + name_len].to_vec()).ok()?;
        let type_tag = data[2 + name_len];
        let flags = data[2 + name_len + 1];
        let mut consumed = 2 + name_len + 2;

        let data_type = DataType::from_tag(type_tag)?;

        let default_value = if data.len() > consumed {
            let tag = data[consumed];
            consumed += 1;
            match tag {
                0 => None,
                1 => Some(DefaultValue::Null),
                2 => {
                    if data.len() < consumed + 8 {
                        return None;
                    }
                    let n = i64::from_le_bytes(data[consumed..consumed + 8].try_into().unwrap());
                    consumed += 8;
                    Some(DefaultValue::Int64(n))
                }
                3 => {
                    if data.len() < consumed + 1 {
                        return None;
                    }
                    let b = data[consumed] != 0;
                    consumed += 1;
                    Some(DefaultValue::Bool(b))
                }
                4 => {
                    if data.len() < consumed + 8 {
                        return None;
                    }
                    let n = f64::from_le_bytes(data[consumed..consumed + 8].try_into().unwrap());
                    consumed += 8;
                    Some(DefaultValue::Float64(n))
                }
                5 => {
                    if data.len() < consumed + 2 {
                        return None;
                    }
                    let slen =
                        u16::from_le_bytes(data[consumed..consumed + 2].try_into().unwrap())
                            as usize;
                    consumed += 2;
                    if data.len() < consumed + slen {
                        return None;
                    }
                    let s = String::from_utf8(data[consumed..consumed + slen].to_vec()).ok()?;
                    consumed += slen;
                    Some(DefaultValue::Text(s))
                }
                _ => return None,
            }
        } else {
            None
        };

        let col = ColumnDef {
            name,
            data_type,
            is_primary_key: flags & 0x01 != 0,
            is_unique: flags & 0x02 != 0,
            is_nullable: flags & 0x04 != 0,
            default_value,
        };
        Some((col, consumed))
    }
}
