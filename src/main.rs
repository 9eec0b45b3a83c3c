use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod db;
mod error;
mod models;
mod report;
mod stats;

use error::RecordError;
use models::{AttendanceRecord, AttendanceStatus, GradeRecord, Student, StudentAttendanceSummary};

#[derive(Parser)]
#[command(name = "attendance-stats")]
#[command(about = "Student attendance and grade tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, attendance and grades
    Seed,
    /// Manage the student roster
    Students {
        #[command(subcommand)]
        command: StudentCommands,
    },
    /// Record or import attendance
    Attendance {
        #[command(subcommand)]
        command: AttendanceCommands,
    },
    /// Record or import grades
    Grades {
        #[command(subcommand)]
        command: GradeCommands,
    },
    /// Attendance and grade statistics for one student
    Stats {
        #[arg(long)]
        student: String,
        #[arg(long)]
        json: bool,
    },
    /// Roster-wide attendance for a single day
    Today {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Monthly roster attendance report
    Report {
        /// Month in YYYY-MM form, defaults to the current month
        #[arg(long)]
        month: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also export the roster table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Markdown report for one student
    StudentReport {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "student-report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum StudentCommands {
    /// List enrolled students
    List {
        /// Only show students whose name or number contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Enroll or update a student
    Add {
        #[arg(long)]
        number: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        grade_level: Option<String>,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        contact_number: Option<String>,
        #[arg(long)]
        guardian_name: Option<String>,
        #[arg(long)]
        guardian_contact: Option<String>,
    },
    /// Remove a student along with their attendance and grades
    Remove {
        #[arg(long)]
        number: String,
    },
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand)]
enum AttendanceCommands {
    /// Mark one student's attendance
    Mark {
        #[arg(long)]
        student: String,
        #[arg(long)]
        status: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        time_in: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change an existing attendance row
    #[command(group(
        ArgGroup::new("changes")
            .args(["status", "time_in", "notes"])
            .required(true)
            .multiple(true)
    ))]
    Update {
        #[arg(long)]
        student: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        time_in: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a student's attendance for a day
    Remove {
        #[arg(long)]
        student: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Import attendance rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand)]
enum GradeCommands {
    /// Record a grade
    Add {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        value: String,
        #[arg(long = "type", default_value = "quiz")]
        grade_type: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        quarter: Option<String>,
    },
    /// Delete a student's grades in a subject
    Remove {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long = "type")]
        grade_type: Option<String>,
    },
    /// Import grades from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the attendance Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!("connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Students { command } => run_students(&pool, command).await?,
        Commands::Attendance { command } => run_attendance(&pool, command).await?,
        Commands::Grades { command } => run_grades(&pool, command).await?,
        Commands::Stats { student, json } => {
            let student = require_student(&pool, &student).await?;
            let attendance = db::fetch_attendance_by_student(&pool, student.id, None).await?;
            let grades = db::fetch_grades_by_student(&pool, student.id).await?;
            let attendance_stats = stats::compute_attendance_stats(&attendance);
            let grade_stats = stats::compute_grade_stats(&grades);

            if json {
                let payload = serde_json::json!({
                    "student": student,
                    "attendance": attendance_stats,
                    "grades": grade_stats,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            println!(
                "{} ({}) attendance {:.1}% across {} days",
                student.full_name(),
                student.student_number,
                attendance_stats.rate,
                attendance_stats.total
            );
            println!(
                "- present {}, late {}, absent {}, excused {}",
                attendance_stats.present,
                attendance_stats.late,
                attendance_stats.absent,
                attendance_stats.excused
            );
            println!(
                "Grade average {:.1} across {} grades",
                grade_stats.average, grade_stats.total
            );
            for (subject, summary) in &grade_stats.by_subject {
                println!("- {}: {:.1} ({} grades)", subject, summary.average, summary.count);
            }
        }
        Commands::Today { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let students = db::fetch_students(&pool).await?;
            let records = db::fetch_attendance_by_date(&pool, date).await?;
            let snapshot = stats::compute_daily_snapshot(students.len(), &records);
            print!("{}", report::format_daily_snapshot(date, &snapshot));
        }
        Commands::Report { month, out, csv } => {
            let month = month.unwrap_or_else(|| Local::now().format("%Y-%m").to_string());
            let (start, end) = report::month_bounds(&month)?;
            let students = db::fetch_students(&pool).await?;

            let mut summaries = Vec::with_capacity(students.len());
            for student in students {
                let records =
                    db::fetch_attendance_by_student(&pool, student.id, Some((start, end))).await?;
                summaries.push(StudentAttendanceSummary {
                    stats: stats::compute_attendance_stats(&records),
                    student,
                });
            }

            let markdown = report::build_roster_report(&month, start, end, &summaries);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());

            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_roster_csv(file, &summaries)?;
                println!("CSV written to {}.", path.display());
            }
        }
        Commands::StudentReport { student, out } => {
            let student = require_student(&pool, &student).await?;
            let attendance = db::fetch_attendance_by_student(&pool, student.id, None).await?;
            let grades = db::fetch_grades_by_student(&pool, student.id).await?;
            let markdown = report::build_student_report(&student, &attendance, &grades);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Builds the log filter from `RUST_LOG` directives, falling back to `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn require_student(pool: &PgPool, student_number: &str) -> anyhow::Result<Student> {
    db::find_student(pool, student_number)
        .await?
        .ok_or_else(|| RecordError::UnknownStudent(student_number.to_string()).into())
}

async fn run_students(pool: &PgPool, command: StudentCommands) -> anyhow::Result<()> {
    match command {
        StudentCommands::List { search } => {
            let mut students = db::fetch_students(pool).await?;
            if let Some(query) = search.as_deref() {
                students.retain(|student| student.matches_search(query));
            }
            if students.is_empty() {
                println!("No students found.");
                return Ok(());
            }
            for student in students {
                println!(
                    "- {} {} ({}, {})",
                    student.student_number,
                    student.full_name(),
                    student.grade_level.as_deref().unwrap_or("no grade"),
                    student.section.as_deref().unwrap_or("no section")
                );
            }
        }
        StudentCommands::Add {
            number,
            first_name,
            last_name,
            grade_level,
            section,
            email,
            contact_number,
            guardian_name,
            guardian_contact,
        } => {
            let input = db::StudentInput {
                student_number: number,
                first_name,
                last_name,
                grade_level,
                section,
                email,
                contact_number,
                guardian_name,
                guardian_contact,
            };
            let student = db::insert_student(pool, &input).await?;
            println!("Saved {} ({}).", student.full_name(), student.student_number);
        }
        StudentCommands::Remove { number } => {
            if db::delete_student(pool, &number).await? {
                println!("Removed {number}.");
            } else {
                return Err(RecordError::UnknownStudent(number).into());
            }
        }
        StudentCommands::Import { csv } => {
            let saved = db::import_students_csv(pool, &csv).await?;
            println!("Saved {saved} students from {}.", csv.display());
        }
    }
    Ok(())
}

async fn run_attendance(pool: &PgPool, command: AttendanceCommands) -> anyhow::Result<()> {
    match command {
        AttendanceCommands::Mark {
            student,
            status,
            date,
            time_in,
            notes,
        } => {
            let status = AttendanceStatus::parse_known(&status)?;
            let student = require_student(pool, &student).await?;
            let now = Local::now();
            let time_in = match time_in {
                Some(value) => Some(value),
                None if status.implies_arrival() => Some(now.format("%H:%M").to_string()),
                None => None,
            };
            let record = AttendanceRecord {
                student_id: student.id,
                date: date.unwrap_or_else(|| now.date_naive()),
                status,
                time_in,
                notes,
            };
            db::replace_attendance(pool, &record).await?;
            println!(
                "Marked {} {} on {}.",
                student.full_name(),
                record.status,
                record.date
            );
        }
        AttendanceCommands::Update {
            student,
            date,
            status,
            time_in,
            notes,
        } => {
            let update = db::AttendanceUpdate {
                status: status
                    .as_deref()
                    .map(AttendanceStatus::parse_known)
                    .transpose()?,
                time_in,
                notes,
            };
            let student = require_student(pool, &student).await?;
            let updated = db::update_attendance(pool, student.id, date, &update).await?;
            if updated == 0 {
                anyhow::bail!("no attendance for {} on {}", student.full_name(), date);
            }
            println!("Updated attendance for {} on {}.", student.full_name(), date);
        }
        AttendanceCommands::Remove { student, date } => {
            let student = require_student(pool, &student).await?;
            let removed = db::delete_attendance(pool, student.id, date).await?;
            println!(
                "Removed {removed} attendance rows for {} on {}.",
                student.full_name(),
                date
            );
        }
        AttendanceCommands::Import { csv } => {
            let inserted = db::import_attendance_csv(pool, &csv).await?;
            println!("Inserted {inserted} attendance rows from {}.", csv.display());
        }
    }
    Ok(())
}

async fn run_grades(pool: &PgPool, command: GradeCommands) -> anyhow::Result<()> {
    match command {
        GradeCommands::Add {
            student,
            subject,
            value,
            grade_type,
            description,
            date,
            quarter,
        } => {
            let grade_value = models::parse_grade_value(&value)?;
            let student = require_student(pool, &student).await?;
            let record = GradeRecord {
                student_id: student.id,
                subject,
                grade_value,
                grade_type,
                description,
                date: Some(date.unwrap_or_else(|| Local::now().date_naive())),
                quarter,
            };
            db::insert_grade(pool, &record).await?;
            println!(
                "Recorded {} {} {:.1} for {}.",
                record.subject,
                record.grade_type,
                record.grade_value,
                student.full_name()
            );
        }
        GradeCommands::Remove {
            student,
            subject,
            date,
            grade_type,
        } => {
            let student = require_student(pool, &student).await?;
            let removed =
                db::delete_grades(pool, student.id, &subject, date, grade_type.as_deref()).await?;
            println!("Removed {removed} {subject} grades for {}.", student.full_name());
        }
        GradeCommands::Import { csv } => {
            let inserted = db::import_grades_csv(pool, &csv).await?;
            println!("Inserted {inserted} grades from {}.", csv.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_add_accepts_contact_number() {
        let cli = Cli::try_parse_from([
            "attendance-stats",
            "students",
            "add",
            "--number",
            "STU003",
            "--first-name",
            "Ana",
            "--last-name",
            "Reyes",
            "--contact-number",
            "09170000000",
            "--guardian-name",
            "Luz Reyes",
        ])
        .unwrap();

        match cli.command {
            Commands::Students {
                command:
                    StudentCommands::Add {
                        contact_number,
                        guardian_name,
                        ..
                    },
            } => {
                assert_eq!(contact_number.as_deref(), Some("09170000000"));
                assert_eq!(guardian_name.as_deref(), Some("Luz Reyes"));
            }
            _ => panic!("expected students add"),
        }
    }

    #[test]
    fn attendance_update_requires_a_change() {
        let missing = Cli::try_parse_from([
            "attendance-stats",
            "attendance",
            "update",
            "--student",
            "STU001",
            "--date",
            "2026-02-03",
        ]);
        assert!(missing.is_err());

        let cli = Cli::try_parse_from([
            "attendance-stats",
            "attendance",
            "update",
            "--student",
            "STU001",
            "--date",
            "2026-02-03",
            "--status",
            "present",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Attendance {
                command: AttendanceCommands::Update { status: Some(_), .. }
            }
        ));
    }

    #[test]
    fn students_list_takes_search() {
        let cli =
            Cli::try_parse_from(["attendance-stats", "students", "list", "--search", "cruz"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Students {
                command: StudentCommands::List { search: Some(ref q) }
            } if q == "cruz"
        ));
    }

    #[test]
    fn log_filter_keeps_per_target_directives() {
        let filter = log_filter(Some("classroom_attendance_stats=debug"));
        assert_eq!(filter.to_string(), "classroom_attendance_stats=debug");
        assert_eq!(log_filter(None).to_string(), "info");
    }
}
