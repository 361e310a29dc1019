// src/schema/aliases.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Historical column names (after cleanup) and the canonical name each maps to.
static DEFAULT_ALIASES: &[(&str, &str)] = &[
    // case information
    ("NUMBER", "CASE_NUMBER"),
    ("STATUS", "CASE_STATUS"),
    ("EMP", "EMPLOYER"),
    ("CASE_NO", "CASE_NUMBER"),
    // industry of employer
    ("NAIC_CODE", "NAICS_CODE"),
    ("2007_NAICS_US_CODE", "NAICS_CODE"),
    ("NAICS_US_CODE", "NAICS_CODE"),
    // occupation
    ("FULL_TIME_POS", "FULL_TIME_POSITION"),
    ("PW_SOC_CODE", "SOC_CODE"),
    ("PW_JOB_TITLE", "JOB_TITLE"),
    // wage
    ("WAGE_OFFER_FROM", "WAGE_RATE_FROM"),
    ("WAGE_OFFER_TO", "WAGE_RATE_TO"),
    ("WAGE_OFFERED_FROM", "WAGE_RATE_FROM"),
    ("WAGE_OFFERED_TO", "WAGE_RATE_TO"),
    ("WAGE_RATE_OF_PAY_FROM", "WAGE_RATE_FROM"),
    ("WAGE_RATE_OF_PAY_TO", "WAGE_RATE_TO"),
    ("WAGE_UNIT_OF_PAY", "WAGE_RATE_UNIT"),
    ("WAGE_RATE_OF_PAY", "WAGE_RATE_FROM"),
    ("WAGE_RATE_OF_PAY_FROM_1", "WAGE_RATE_FROM"),
    ("WAGE_RATE_OF_PAY_TO_1", "WAGE_RATE_TO"),
    ("WAGE_UNIT_OF_PAY_1", "WAGE_RATE_UNIT"),
    ("PW_UNIT_1", "UNIT_OF_PAY"),
    ("PW_UNIT", "UNIT_OF_PAY"),
    ("PW_UNIT_OF_PAY", "UNIT_OF_PAY"),
    ("PW_UNIT_OF_PAY_1", "UNIT_OF_PAY"),
    // employer
    ("EMPLOYER_ADDRESS1", "EMPLOYER_ADDRESS"),
    ("EMPLOYER_ADDRESS_1", "EMPLOYER_ADDRESS"),
    ("EMPLOYER_STATE_PROVINCE", "EMPLOYER_STATE"),
    ("TOTAL_WORKER_POSITIONS", "TOTAL_WORKERS"),
    // worksite
    ("WORK_LOCATION_CITY1", "WORKSITE_CITY"),
    ("WORK_LOCATION_STATE1", "WORKSITE_STATE"),
    ("WORKLOC1_CITY", "WORKSITE_CITY"),
    ("WORKLOC1_STATE", "WORKSITE_STATE"),
    ("WORKSITE_CITY_1", "WORKSITE_CITY"),
    ("WORKSITE_STATE_1", "WORKSITE_STATE"),
    ("WORKSITE_POSTAL_CODE_1", "WORKSITE_POSTAL_CODE"),
    ("WORKSITE_ADDRESS1_1", "WORKSITE_ADDRESS1"),
    ("WORKSITE_ADDRESS_1", "WORKSITE_ADDRESS1"),
    ("JOB_INFO_WORK_CITY", "WORKSITE_CITY"),
    ("JOB_INFO_WORK_STATE", "WORKSITE_STATE"),
    ("JOB_INFO_WORK_POSTAL_CODE", "WORKSITE_POSTAL_CODE"),
];

/// Many-to-one map from historical column names to canonical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct AliasMap {
    map: HashMap<String, String>,
}

impl AliasMap {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            map: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Canonical name for a cleaned column name, if it is a known alias.
    pub fn resolve(&self, cleaned: &str) -> Option<&str> {
        self.map.get(cleaned).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for AliasMap {
    fn default() -> Self {
        Self::new(DEFAULT_ALIASES.iter().copied())
    }
}

impl From<BTreeMap<String, String>> for AliasMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::new(map)
    }
}

impl From<AliasMap> for BTreeMap<String, String> {
    fn from(aliases: AliasMap) -> Self {
        aliases.map.into_iter().collect()
    }
}

/// What to do when two source columns resolve to the same canonical column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasConflictPolicy {
    /// Fail the batch with a conflict error naming every colliding column.
    #[default]
    Reject,
    /// The column appearing later in the file wins; the earlier one is dropped.
    LastWins,
}
