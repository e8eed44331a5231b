//! `Condition`: an OR of ANDs, equality-only.

use crate::field::ColumnDescriptor;

/// One AND group: an ordered sequence of `column = value` equalities.
/// Ordering is preserved in the emitted SQL.
pub type AndGroup = Vec<ColumnDescriptor>;

/// `(a=x AND b=y) OR (c=z)` — AND groups compose left-to-right with `OR`
/// separators; each group is parenthesized even when it has one element.
#[derive(Clone, Debug, Default)]
pub struct Condition {
    groups: Vec<AndGroup>,
}

impl Condition {
    pub fn new() -> Self {
        Condition { groups: Vec::new() }
    }

    pub fn add_group(&mut self, group: AndGroup) {
        self.groups.push(group);
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[AndGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    #[test]
    fn empty_condition_has_no_groups() {
        let c = Condition::new();
        assert!(c.is_empty());
    }

    #[test]
    fn groups_preserve_insertion_order() {
        let mut c = Condition::new();
        c.add_group(vec![ColumnDescriptor::new("id", FieldValue::Int32(1))]);
        c.add_group(vec![ColumnDescriptor::new("id", FieldValue::Int32(2))]);
        assert_eq!(c.groups().len(), 2);
        assert_eq!(c.groups()[0][0].name, "id");
    }
}
