use thiserror::Error;

/// Fatal configuration problems. Raised before any well is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid analysis parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    #[error("invalid column {column} in `{field}` (expected 1-12)")]
    ColumnOutOfRange { field: &'static str, column: u8 },
    #[error("column {column} is assigned to both `{first}` and `{second}`")]
    OverlappingColumns {
        column: u8,
        first: &'static str,
        second: &'static str,
    },
    #[error("column layout uses {rows} rows but a plate column only has 8")]
    ColumnLayoutTooTall { rows: usize },
    #[error("threshold_value must be finite, got {0}")]
    InvalidThreshold(f64),
    #[error(
        "sample '{sample_id}' is both a test sample and the positive control; self-referential normalization is ambiguous"
    )]
    SelfReferentialControl { sample_id: String },
    #[error("invalid QC parameter `{field}` for test '{test}': {reason}")]
    InvalidQcParameter {
        test: &'static str,
        field: &'static str,
        reason: String,
    },
    #[error("invalid frame interval {0} (must be finite and > 0)")]
    InvalidFrameInterval(f64),
}

/// Localized data problems. They null out a well, group or sample and the run
/// continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIssue {
    #[error(
        "insufficient baseline: {baseline_frames} baseline frames for a {len}-frame trace"
    )]
    BaselineTooShort { baseline_frames: usize, len: usize },
    #[error("insufficient baseline: F0 = {f0} (must be finite and > 0)")]
    NonPositiveBaseline { f0: f64 },
    #[error("data unavailable: group '{group}' has no wells with valid values")]
    EmptyGroup { group: String },
    #[error("missing {reference} data for sample '{sample_id}'")]
    MissingReference {
        reference: &'static str,
        sample_id: String,
    },
}
