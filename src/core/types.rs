use std::fmt;

/// Identifier of a tree row.
pub type EntityId = i64;

/// Identifier of a dome, the container a tree lives in.
pub type NamespaceId = i64;

/// Column types the schema guard and the bind layer know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

/// One column the schema guard expects to find on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub table: &'static str,
    pub column: &'static str,
    pub data_type: DataType,
    /// SQL default literal appended to `ADD COLUMN`, if any.
    pub default: Option<&'static str>,
}

impl ColumnDescriptor {
    pub const fn new(table: &'static str, column: &'static str, data_type: DataType) -> Self {
        Self {
            table,
            column,
            data_type,
            default: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }
}
