//! `Statement`: the Builder's input shape.

use crate::condition::Condition;
use crate::field::ColumnDescriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    CreateTable,
    DropTable,
    RenameTable,
    Insert,
    Update,
    Delete,
    Select,
    Grant,
    Revoke,
}

#[derive(Clone, Debug, Default)]
pub struct Statement {
    pub kind: Option<StatementKind>,
    /// Ordered table names. Rename uses two entries: `[from, to]`.
    pub tables: Vec<String>,
    pub fields: Vec<ColumnDescriptor>,
    pub conditions: Condition,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Statement {
            kind: Some(kind),
            tables: Vec::new(),
            fields: Vec::new(),
            conditions: Condition::new(),
        }
    }

    pub fn add_table(&mut self, name: impl Into<String>) {
        self.tables.push(name.into());
    }

    pub fn add_field(&mut self, field: ColumnDescriptor) {
        self.fields.push(field);
    }

    pub fn add_condition(&mut self, group: Vec<ColumnDescriptor>) {
        self.conditions.add_group(group);
    }

    pub fn clear(&mut self) {
        *self = Statement::default();
    }
}
