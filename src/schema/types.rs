// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::aliases::AliasMap;
use super::columns::PROGRAM;
use crate::process::utils::clean_column_name;

/// A named semantic category of canonical columns (case, wage, worksite, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnGroup {
    pub name: String,
    pub columns: Vec<String>,
}

impl ColumnGroup {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// The fixed target schema every yearly batch is projected onto.
///
/// Groups keep their configured order; a column listed in more than one group
/// appears once, at its first position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CanonicalSchema {
    groups: Vec<ColumnGroup>,
}

impl CanonicalSchema {
    pub fn new(groups: Vec<ColumnGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    /// Canonical columns in output order, without duplicates.
    pub fn columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.columns.iter())
            .map(String::as_str)
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Canonical columns followed by the program label.
    pub fn output_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.columns().into_iter().map(str::to_string).collect();
        cols.retain(|c| c != PROGRAM);
        cols.push(PROGRAM.to_string());
        cols
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups
            .iter()
            .any(|g| g.columns.iter().any(|c| c == name))
    }
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::new(vec![
            ColumnGroup::new(
                "case_columns",
                &["CASE_NUMBER", "CASE_STATUS", "DECISION_DATE"],
            ),
            ColumnGroup::new("industry_columns", &["NAICS_CODE"]),
            ColumnGroup::new("occ_columns", &["SOC_CODE", "JOB_TITLE"]),
            ColumnGroup::new(
                "wage_columns",
                &["WAGE_RATE_FROM", "WAGE_RATE_TO", "UNIT_OF_PAY"],
            ),
            ColumnGroup::new(
                "emp_cols",
                &[
                    "EMPLOYER_ADDRESS",
                    "EMPLOYER_CITY",
                    "EMPLOYER_NAME",
                    "EMPLOYER_POSTAL_CODE",
                    "EMPLOYER_STATE",
                    "TOTAL_WORKERS",
                ],
            ),
            ColumnGroup::new(
                "worksite_columns",
                &[
                    "WORKSITE_STATE",
                    "WORKSITE_CITY",
                    "WORKSITE_POSTAL_CODE",
                    "WORKSITE_ADDRESS1",
                ],
            ),
        ])
    }
}

/// How a published header lands in the canonical schema.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Canonical,
    Alias,
    Unmapped,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnResolution {
    pub raw: String,
    pub cleaned: String,
    pub target: Option<String>,
    pub resolution: Resolution,
}

/// Describe where a raw header ends up after cleanup and alias resolution.
/// Year-specific corrections are not applied here.
pub fn resolve_header(raw: &str, aliases: &AliasMap, schema: &CanonicalSchema) -> ColumnResolution {
    let cleaned = clean_column_name(raw);
    let (target, resolution) = match aliases.resolve(&cleaned) {
        Some(t) if schema.contains(t) => (Some(t.to_string()), Resolution::Alias),
        Some(_) => (None, Resolution::Unmapped),
        None if schema.contains(&cleaned) => (Some(cleaned.clone()), Resolution::Canonical),
        None => (None, Resolution::Unmapped),
    };
    ColumnResolution {
        raw: raw.to_string(),
        cleaned,
        target,
        resolution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_columns_end_with_program_label() {
        let schema = CanonicalSchema::default();
        let cols = schema.output_columns();
        assert_eq!(cols.len(), 20);
        assert_eq!(cols.first().map(String::as_str), Some("CASE_NUMBER"));
        assert_eq!(cols.last().map(String::as_str), Some("PROGRAM"));
    }

    #[test]
    fn duplicate_columns_keep_first_position() {
        let schema = CanonicalSchema::new(vec![
            ColumnGroup::new("a", &["X", "Y"]),
            ColumnGroup::new("b", &["Y", "Z"]),
        ]);
        assert_eq!(schema.columns(), vec!["X", "Y", "Z"]);
        assert_eq!(schema.output_columns(), vec!["X", "Y", "Z", "PROGRAM"]);
    }

    #[test]
    fn resolve_header_classifies_columns() {
        let schema = CanonicalSchema::default();
        let aliases = AliasMap::default();

        let r = resolve_header(" lca_case_wage_rate_of_pay_from ", &aliases, &schema);
        assert_eq!(r.cleaned, "WAGE_RATE_OF_PAY_FROM");
        assert_eq!(r.target.as_deref(), Some("WAGE_RATE_FROM"));
        assert_eq!(r.resolution, Resolution::Alias);

        let r = resolve_header("Case Status", &aliases, &schema);
        assert_eq!(r.resolution, Resolution::Canonical);

        // aliased, but to a column outside the schema
        let r = resolve_header("WAGE_UNIT_OF_PAY", &aliases, &schema);
        assert_eq!(r.resolution, Resolution::Unmapped);

        let r = resolve_header("VISA_CLASS", &aliases, &schema);
        assert_eq!(r.resolution, Resolution::Unmapped);
        assert_eq!(r.target, None);
    }
}
