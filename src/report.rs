use std::fmt::Write;

use chrono::{Datelike, NaiveDate};

use crate::error::RecordError;
use crate::models::{
    AttendanceRecord, DailySnapshot, GradeRecord, Student, StudentAttendanceSummary,
};
use crate::stats;

/// First and last day of a `YYYY-MM` month.
pub fn month_bounds(month: &str) -> Result<(NaiveDate, NaiveDate), RecordError> {
    let invalid = || RecordError::InvalidMonth(month.to_string());
    let start = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| invalid())?;
    let (next_year, next_month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid)?;
    Ok((start, end))
}

pub fn rate_band(rate: f64) -> &'static str {
    if rate >= 90.0 {
        "good"
    } else if rate >= 75.0 {
        "fair"
    } else {
        "low"
    }
}

pub fn build_roster_report(
    month: &str,
    start: NaiveDate,
    end: NaiveDate,
    summaries: &[StudentAttendanceSummary],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report {}", month);
    let _ = writeln!(output, "Covering {} to {}", start, end);
    let _ = writeln!(output);

    if summaries.is_empty() {
        let _ = writeln!(output, "No students enrolled.");
        return output;
    }

    let _ = writeln!(
        output,
        "| Student ID | Name | Days | Present | Absent | Late | Excused | Rate |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
    for summary in summaries {
        let stats = &summary.stats;
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} | {:.0}% ({}) |",
            summary.student.student_number,
            summary.student.full_name(),
            stats.total,
            stats.present,
            stats.absent,
            stats.late,
            stats.excused,
            stats.rate,
            rate_band(stats.rate)
        );
    }

    let mut flagged: Vec<&StudentAttendanceSummary> = summaries
        .iter()
        .filter(|s| s.stats.total > 0 && s.stats.rate < 75.0)
        .collect();
    flagged.sort_by(|a, b| {
        a.stats
            .rate
            .partial_cmp(&b.stats.rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Below 75% Attendance");
    if flagged.is_empty() {
        let _ = writeln!(output, "Every student with records is at or above 75%.");
    } else {
        for summary in flagged {
            let _ = writeln!(
                output,
                "- {} ({}) {:.1}% across {} days",
                summary.student.full_name(),
                summary.student.student_number,
                summary.stats.rate,
                summary.stats.total
            );
        }
    }

    output
}

/// Writes the roster summary as CSV, one row per student.
pub fn write_roster_csv<W: std::io::Write>(
    writer: W,
    summaries: &[StudentAttendanceSummary],
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Student ID",
        "First Name",
        "Last Name",
        "Total Days",
        "Present",
        "Absent",
        "Late",
        "Excused",
        "Attendance Rate",
    ])?;

    for summary in summaries {
        let stats = &summary.stats;
        csv.write_record([
            summary.student.student_number.clone(),
            summary.student.first_name.clone(),
            summary.student.last_name.clone(),
            stats.total.to_string(),
            stats.present.to_string(),
            stats.absent.to_string(),
            stats.late.to_string(),
            stats.excused.to_string(),
            format!("{:.0}%", stats.rate.round()),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn build_student_report(
    student: &Student,
    attendance: &[AttendanceRecord],
    grades: &[GradeRecord],
) -> String {
    let attendance_stats = stats::compute_attendance_stats(attendance);
    let grade_stats = stats::compute_grade_stats(grades);
    let mut output = String::new();

    let _ = writeln!(output, "# Student Report: {}", student.full_name());
    let _ = writeln!(
        output,
        "Student ID {}{}",
        student.student_number,
        match (&student.grade_level, &student.section) {
            (Some(level), Some(section)) => format!(", {} {}", level, section),
            (Some(level), None) => format!(", {}", level),
            (None, Some(section)) => format!(", {}", section),
            (None, None) => String::new(),
        }
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");
    let _ = writeln!(
        output,
        "- Rate: {:.1}% ({})",
        attendance_stats.rate,
        rate_band(attendance_stats.rate)
    );
    let _ = writeln!(
        output,
        "- {} days recorded: {} present, {} late, {} absent, {} excused",
        attendance_stats.total,
        attendance_stats.present,
        attendance_stats.late,
        attendance_stats.absent,
        attendance_stats.excused
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grades");
    if grade_stats.total == 0 {
        let _ = writeln!(output, "No grades recorded.");
    } else {
        let _ = writeln!(
            output,
            "Overall average {:.1} across {} grades",
            grade_stats.average, grade_stats.total
        );
        for (subject, summary) in &grade_stats.by_subject {
            let _ = writeln!(
                output,
                "- {}: {:.1} ({} grades)",
                subject, summary.average, summary.count
            );
        }
    }

    let mut notes: Vec<&AttendanceRecord> = attendance
        .iter()
        .filter(|r| r.notes.as_deref().is_some_and(|n| !n.trim().is_empty()))
        .collect();
    notes.sort_by(|a, b| b.date.cmp(&a.date));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Attendance Notes");
    if notes.is_empty() {
        let _ = writeln!(output, "No notes recorded.");
    } else {
        for record in notes.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                record.date,
                record.status,
                record.notes.as_deref().unwrap_or_default()
            );
        }
    }

    output
}

pub fn format_daily_snapshot(date: NaiveDate, snapshot: &DailySnapshot) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Attendance for {}", date);
    let _ = writeln!(output, "- Students: {}", snapshot.total_students);
    let _ = writeln!(output, "- Present: {}", snapshot.present);
    let _ = writeln!(output, "- Late: {}", snapshot.late);
    let _ = writeln!(output, "- Absent: {}", snapshot.absent);
    let _ = writeln!(output, "- Excused: {}", snapshot.excused);
    let _ = writeln!(output, "- Not yet marked: {}", snapshot.unmarked);
    let _ = writeln!(output, "- Present rate: {:.1}%", snapshot.rate);
    output
}
