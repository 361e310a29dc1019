pub mod aliases;
pub mod rules;
pub mod types;

pub use aliases::{AliasConflictPolicy, AliasMap};
pub use rules::{ProgramYear, ProgramYears, SpecialCaseRules};
pub use types::{resolve_header, CanonicalSchema, ColumnGroup, ColumnResolution, Resolution};

/// Column names the corrective rules touch directly.
pub mod columns {
    pub const PROGRAM: &str = "PROGRAM";
    pub const TOTAL_WORKERS: &str = "TOTAL_WORKERS";
    pub const WAGE_RATE_FROM: &str = "WAGE_RATE_FROM";
    pub const WAGE_RATE_TO: &str = "WAGE_RATE_TO";
    pub const WORKSITE_POSTAL_CODE: &str = "WORKSITE_POSTAL_CODE";
    pub const WORKSITE_ADDRESS1: &str = "WORKSITE_ADDRESS1";
}
