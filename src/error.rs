use thiserror::Error;

/// Failures raised while harmonizing a single program-year batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarmonizeError {
    #[error(
        "alias conflict in program {program}, year {year}: columns {sources:?} all resolve to `{target}`"
    )]
    AliasConflict {
        program: String,
        year: u16,
        target: String,
        sources: Vec<String>,
    },

    #[error("table shape mismatch: expected columns {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}
