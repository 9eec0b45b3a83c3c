use thiserror::Error;

/// Rejections raised while turning raw store or import rows into typed records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("grade value {0:?} is not a number")]
    InvalidGradeValue(String),

    #[error("unrecognised attendance status {0:?} (expected present, absent, late or excused)")]
    UnknownStatus(String),

    #[error("no student with number {0:?}")]
    UnknownStudent(String),

    #[error("month {0:?} is not in YYYY-MM form")]
    InvalidMonth(String),
}
