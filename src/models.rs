use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::RecordError;

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub grade_level: Option<String>,
    pub section: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_contact: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Case-insensitive substring match on first name, last name or student number.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        [&self.first_name, &self.last_name, &self.student_number]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

/// Attendance status, normalised to lower case when parsed.
///
/// Anything outside the four known values is kept verbatim as `Unknown` so it
/// still counts toward totals without landing in any category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    Unknown(String),
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Self::Present,
            "absent" => Self::Absent,
            "late" => Self::Late,
            "excused" => Self::Excused,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    /// Like [`AttendanceStatus::parse`] but refuses values outside the known set.
    pub fn parse_known(raw: &str) -> Result<Self, RecordError> {
        match Self::parse(raw) {
            Self::Unknown(value) => Err(RecordError::UnknownStatus(value)),
            status => Ok(status),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
            Self::Unknown(value) => value,
        }
    }

    /// Present and late rows carry an arrival time.
    pub fn implies_arrival(&self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

impl Default for AttendanceStatus {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<String> for AttendanceStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<AttendanceStatus> for String {
    fn from(value: AttendanceStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: AttendanceStatus,
    pub time_in: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    pub student_id: Uuid,
    pub subject: String,
    #[serde(deserialize_with = "deserialize_grade_value")]
    pub grade_value: f64,
    pub grade_type: String,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub quarter: Option<String>,
}

/// Parses a grade value that arrived as text.
pub fn parse_grade_value(raw: &str) -> Result<f64, RecordError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RecordError::InvalidGradeValue(raw.to_string())),
    }
}

fn deserialize_grade_value<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(value) => Ok(value),
        NumberOrText::Text(text) => parse_grade_value(&text).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubjectGrades {
    pub sum: f64,
    pub count: usize,
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStats {
    pub total: usize,
    pub average: f64,
    pub by_subject: BTreeMap<String, SubjectGrades>,
}

/// Roster-wide counts for a single day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailySnapshot {
    pub total_students: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub unmarked: usize,
    pub rate: f64,
}

#[derive(Debug, Clone)]
pub struct StudentAttendanceSummary {
    pub student: Student,
    pub stats: AttendanceStats,
}
