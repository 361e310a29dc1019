// src/schema/rules.rs

use serde::{Deserialize, Serialize};

use super::columns::{WORKSITE_ADDRESS1, WORKSITE_POSTAL_CODE};

/// Delimiter between the two ends of a wage range published as one string.
pub const WAGE_RANGE_DELIMITER: &str = " -";

/// A single program in a single year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramYear {
    pub program: String,
    pub year: u16,
}

/// A program over an inclusive span of years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramYears {
    pub program: String,
    pub from: u16,
    pub to: u16,
}

impl ProgramYears {
    pub fn matches(&self, program: &str, year: u16) -> bool {
        self.program == program && (self.from..=self.to).contains(&year)
    }
}

/// Program/year keyed corrections applied between alias resolution and
/// schema projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialCaseRules {
    /// Programs whose filings always cover exactly one worker.
    pub single_worker_programs: Vec<String>,
    /// Worksite columns that only exist in later years; created empty when absent.
    pub late_columns: Vec<String>,
    /// Batches whose wage-from column holds a `"<from> - <to>"` range string.
    pub wage_range_strings: Vec<ProgramYear>,
    /// Batches published with the multi-worksite form layout.
    pub form_layout: Vec<ProgramYears>,
}

impl Default for SpecialCaseRules {
    fn default() -> Self {
        Self {
            single_worker_programs: vec!["PERM".to_string()],
            late_columns: vec![
                WORKSITE_POSTAL_CODE.to_string(),
                WORKSITE_ADDRESS1.to_string(),
            ],
            wage_range_strings: vec![ProgramYear {
                program: "LCA".to_string(),
                year: 2015,
            }],
            form_layout: vec![ProgramYears {
                program: "LCA".to_string(),
                from: 2019,
                to: 2024,
            }],
        }
    }
}

impl SpecialCaseRules {
    pub fn is_single_worker(&self, program: &str) -> bool {
        self.single_worker_programs.iter().any(|p| p == program)
    }

    pub fn splits_wage_range(&self, program: &str, year: u16) -> bool {
        self.wage_range_strings
            .iter()
            .any(|r| r.program == program && r.year == year)
    }

    pub fn uses_form_layout(&self, program: &str, year: u16) -> bool {
        self.form_layout.iter().any(|r| r.matches(program, year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_match_known_anomalies() {
        let rules = SpecialCaseRules::default();
        assert!(rules.is_single_worker("PERM"));
        assert!(!rules.is_single_worker("LCA"));

        assert!(rules.splits_wage_range("LCA", 2015));
        assert!(!rules.splits_wage_range("LCA", 2016));
        assert!(!rules.splits_wage_range("PERM", 2015));

        assert!(!rules.uses_form_layout("LCA", 2018));
        assert!(rules.uses_form_layout("LCA", 2019));
        assert!(rules.uses_form_layout("LCA", 2024));
        assert!(!rules.uses_form_layout("LCA", 2025));
        assert!(!rules.uses_form_layout("PERM", 2020));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let rules: SpecialCaseRules =
            serde_yaml::from_str("single_worker_programs: [PERM, H-2A]\n").unwrap();
        assert!(rules.is_single_worker("H-2A"));
        assert!(rules.splits_wage_range("LCA", 2015));
    }
}
