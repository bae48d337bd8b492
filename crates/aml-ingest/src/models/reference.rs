//! Taxonomy reference data that promoted rows are resolved against.

use aml_common::LocalizedText;
use serde::{Deserialize, Serialize};

/// One active row of a reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub identifier: String,
    pub name: LocalizedText,
}

impl ReferenceItem {
    pub fn new(identifier: impl Into<String>, name: &str) -> Self {
        Self {
            identifier: identifier.into(),
            name: LocalizedText::en(name),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name.english().map(str::trim) == Some(name.trim())
    }
}

/// A reference resolved by name, embedded in the promoted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    pub identifier: String,
    pub name: LocalizedText,
}

impl From<&ReferenceItem> for ResolvedRef {
    fn from(item: &ReferenceItem) -> Self {
        Self {
            identifier: item.identifier.clone(),
            name: item.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
    Boards,
    Classes,
    Skills,
    SubSkills,
    Tenants,
    Repositories,
}

impl ReferenceTable {
    pub const ALL: [ReferenceTable; 6] = [
        ReferenceTable::Boards,
        ReferenceTable::Classes,
        ReferenceTable::Skills,
        ReferenceTable::SubSkills,
        ReferenceTable::Tenants,
        ReferenceTable::Repositories,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::Boards => "boards",
            ReferenceTable::Classes => "classes",
            ReferenceTable::Skills => "skills",
            ReferenceTable::SubSkills => "sub_skills",
            ReferenceTable::Tenants => "tenants",
            ReferenceTable::Repositories => "repositories",
        }
    }
}

/// Snapshot of every reference table, loaded once per process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub boards: Vec<ReferenceItem>,
    pub classes: Vec<ReferenceItem>,
    pub skills: Vec<ReferenceItem>,
    pub sub_skills: Vec<ReferenceItem>,
    pub tenants: Vec<ReferenceItem>,
    pub repositories: Vec<ReferenceItem>,
}

impl ReferenceData {
    pub fn table(&self, table: ReferenceTable) -> &[ReferenceItem] {
        match table {
            ReferenceTable::Boards => &self.boards,
            ReferenceTable::Classes => &self.classes,
            ReferenceTable::Skills => &self.skills,
            ReferenceTable::SubSkills => &self.sub_skills,
            ReferenceTable::Tenants => &self.tenants,
            ReferenceTable::Repositories => &self.repositories,
        }
    }

    pub fn table_mut(&mut self, table: ReferenceTable) -> &mut Vec<ReferenceItem> {
        match table {
            ReferenceTable::Boards => &mut self.boards,
            ReferenceTable::Classes => &mut self.classes,
            ReferenceTable::Skills => &mut self.skills,
            ReferenceTable::SubSkills => &mut self.sub_skills,
            ReferenceTable::Tenants => &mut self.tenants,
            ReferenceTable::Repositories => &mut self.repositories,
        }
    }

    /// Find an item by its English name.
    pub fn resolve(&self, table: ReferenceTable, name: &str) -> Option<ResolvedRef> {
        self.table(table)
            .iter()
            .find(|item| item.matches(name))
            .map(ResolvedRef::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_english_name() {
        let mut data = ReferenceData::default();
        data.skills.push(ReferenceItem::new("11", "Addition"));
        data.skills.push(ReferenceItem::new("12", "Subtraction"));

        let resolved = data.resolve(ReferenceTable::Skills, " Subtraction ").unwrap();
        assert_eq!(resolved.identifier, "12");
        assert!(data.resolve(ReferenceTable::Skills, "Division").is_none());
        assert!(data.resolve(ReferenceTable::Boards, "Addition").is_none());
    }
}
