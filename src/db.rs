use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RecordError;
use crate::models::{parse_grade_value, AttendanceRecord, AttendanceStatus, GradeRecord, Student};

const STUDENT_COLUMNS: &str = "id, student_number, first_name, last_name, grade_level, section, \
     email, contact_number, guardian_name, guardian_contact";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Fields accepted when enrolling a student.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StudentInput {
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub grade_level: Option<String>,
    pub section: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub guardian_name: Option<String>,
    #[serde(default)]
    pub guardian_contact: Option<String>,
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("7b0f3c5e-1a2d-4c6b-9e8f-0a1b2c3d4e51")?,
            StudentInput {
                student_number: "STU001".to_string(),
                first_name: "Juan".to_string(),
                last_name: "Dela Cruz".to_string(),
                grade_level: Some("Grade 10".to_string()),
                section: Some("Section A".to_string()),
                email: Some("juan@student.com".to_string()),
                contact_number: Some("09123456789".to_string()),
                guardian_name: Some("Maria Dela Cruz".to_string()),
                guardian_contact: Some("09987654321".to_string()),
            },
        ),
        (
            Uuid::parse_str("2c9e4d1f-8b7a-4f3e-a6d5-c4b3a2918f72")?,
            StudentInput {
                student_number: "STU002".to_string(),
                first_name: "Maria".to_string(),
                last_name: "Santos".to_string(),
                grade_level: Some("Grade 10".to_string()),
                section: Some("Section A".to_string()),
                email: Some("maria@student.com".to_string()),
                contact_number: Some("09123456788".to_string()),
                guardian_name: Some("Jose Santos".to_string()),
                guardian_contact: Some("09987654322".to_string()),
            },
        ),
    ];

    for (id, student) in &students {
        upsert_student(pool, *id, student).await?;
    }

    let attendance = vec![
        ("STU001", (2026, 2, 2), "present", Some("08:00"), None),
        ("STU001", (2026, 2, 3), "late", Some("08:20"), Some("Traffic")),
        ("STU001", (2026, 2, 4), "present", Some("07:55"), None),
        ("STU002", (2026, 2, 2), "late", Some("08:15"), Some("Traffic")),
        ("STU002", (2026, 2, 3), "absent", None, None),
        ("STU002", (2026, 2, 4), "excused", None, Some("Medical appointment")),
    ];

    for (number, (y, m, d), status, time_in, notes) in attendance {
        let student_id = student_id_for(pool, number).await?;
        let date = NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?;
        sqlx::query(
            r#"
            INSERT INTO attendance_tracker.attendance (id, student_id, date, time_in, status, notes)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (
                SELECT 1 FROM attendance_tracker.attendance
                WHERE student_id = $2 AND date = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(date)
        .bind(time_in)
        .bind(status)
        .bind(notes)
        .execute(pool)
        .await?;
    }

    let grades = vec![
        ("STU001", "Mathematics", 88.0, "quiz", (2026, 1, 15)),
        ("STU001", "Mathematics", 92.0, "exam", (2026, 1, 29)),
        ("STU001", "Science", 85.0, "project", (2026, 1, 22)),
        ("STU002", "Mathematics", 78.0, "quiz", (2026, 1, 15)),
        ("STU002", "English", 94.0, "assignment", (2026, 1, 20)),
    ];

    for (number, subject, value, grade_type, (y, m, d)) in grades {
        let student_id = student_id_for(pool, number).await?;
        let date = NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?;
        sqlx::query(
            r#"
            INSERT INTO attendance_tracker.grades
            (id, student_id, subject, grade_value, grade_type, date, quarter)
            SELECT $1, $2, $3, CAST($4 AS NUMERIC), $5, $6, 'Q1'
            WHERE NOT EXISTS (
                SELECT 1 FROM attendance_tracker.grades
                WHERE student_id = $2 AND subject = $3 AND grade_type = $5 AND date = $6
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(subject)
        .bind(value)
        .bind(grade_type)
        .bind(date)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn upsert_student(pool: &PgPool, id: Uuid, student: &StudentInput) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO attendance_tracker.students
        (id, student_number, first_name, last_name, grade_level, section, email,
         contact_number, guardian_name, guardian_contact)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (student_number) DO UPDATE
        SET first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            grade_level = EXCLUDED.grade_level,
            section = EXCLUDED.section,
            email = EXCLUDED.email,
            contact_number = EXCLUDED.contact_number,
            guardian_name = EXCLUDED.guardian_name,
            guardian_contact = EXCLUDED.guardian_contact,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(&student.student_number)
    .bind(&student.first_name)
    .bind(&student.last_name)
    .bind(&student.grade_level)
    .bind(&student.section)
    .bind(&student.email)
    .bind(&student.contact_number)
    .bind(&student.guardian_name)
    .bind(&student.guardian_contact)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn insert_student(pool: &PgPool, student: &StudentInput) -> anyhow::Result<Student> {
    let id = upsert_student(pool, Uuid::new_v4(), student).await?;
    info!(student_number = %student.student_number, %id, "student saved");
    find_student(pool, &student.student_number)
        .await?
        .ok_or_else(|| RecordError::UnknownStudent(student.student_number.clone()).into())
}

/// Removes a student; attendance and grades go with it.
pub async fn delete_student(pool: &PgPool, student_number: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM attendance_tracker.students WHERE student_number = $1")
        .bind(student_number)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<Student>> {
    let query = format!(
        "SELECT {STUDENT_COLUMNS} FROM attendance_tracker.students \
         ORDER BY last_name ASC, first_name ASC"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    debug!(count = rows.len(), "fetched students");
    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn find_student(pool: &PgPool, student_number: &str) -> anyhow::Result<Option<Student>> {
    let query =
        format!("SELECT {STUDENT_COLUMNS} FROM attendance_tracker.students WHERE student_number = $1");
    let row = sqlx::query(&query)
        .bind(student_number)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(student_from_row))
}

async fn student_id_for(pool: &PgPool, student_number: &str) -> anyhow::Result<Uuid> {
    let id: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM attendance_tracker.students WHERE student_number = $1")
            .bind(student_number)
            .fetch_optional(pool)
            .await?;
    id.ok_or_else(|| RecordError::UnknownStudent(student_number.to_string()).into())
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        student_number: row.get("student_number"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        grade_level: row.get("grade_level"),
        section: row.get("section"),
        email: row.get("email"),
        contact_number: row.get("contact_number"),
        guardian_name: row.get("guardian_name"),
        guardian_contact: row.get("guardian_contact"),
    }
}

fn attendance_from_row(row: &PgRow) -> AttendanceRecord {
    let status: Option<String> = row.get("status");
    AttendanceRecord {
        student_id: row.get("student_id"),
        date: row.get("date"),
        status: status.map(AttendanceStatus::from).unwrap_or_default(),
        time_in: row.get("time_in"),
        notes: row.get("notes"),
    }
}

/// Attendance for one student, newest first, optionally bounded to `[from, to]`.
pub async fn fetch_attendance_by_student(
    pool: &PgPool,
    student_id: Uuid,
    range: Option<(NaiveDate, NaiveDate)>,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut query = String::from(
        "SELECT student_id, date, time_in, status, notes \
         FROM attendance_tracker.attendance \
         WHERE student_id = $1",
    );

    if range.is_some() {
        query.push_str(" AND date >= $2 AND date <= $3");
    }
    query.push_str(" ORDER BY date DESC");

    let mut rows = sqlx::query(&query).bind(student_id);
    if let Some((from, to)) = range {
        rows = rows.bind(from).bind(to);
    }

    let records = rows.fetch_all(pool).await?;
    debug!(%student_id, count = records.len(), "fetched attendance");
    Ok(records.iter().map(attendance_from_row).collect())
}

pub async fn fetch_attendance_by_date(
    pool: &PgPool,
    date: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let records = sqlx::query(
        "SELECT student_id, date, time_in, status, notes \
         FROM attendance_tracker.attendance WHERE date = $1 \
         ORDER BY created_at ASC",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;
    debug!(%date, count = records.len(), "fetched attendance for day");
    Ok(records.iter().map(attendance_from_row).collect())
}

/// Records a student's attendance for a day, replacing whatever was marked before.
pub async fn replace_attendance(pool: &PgPool, record: &AttendanceRecord) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let replaced = sqlx::query(
        "DELETE FROM attendance_tracker.attendance WHERE student_id = $1 AND date = $2",
    )
    .bind(record.student_id)
    .bind(record.date)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        r#"
        INSERT INTO attendance_tracker.attendance (id, student_id, date, time_in, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.student_id)
    .bind(record.date)
    .bind(&record.time_in)
    .bind(record.status.as_str())
    .bind(&record.notes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(student_id = %record.student_id, date = %record.date, replaced, "attendance saved");
    Ok(())
}

/// Fields changed by `update_attendance`; `None` leaves the column as it is.
#[derive(Debug, Clone, Default)]
pub struct AttendanceUpdate {
    pub status: Option<AttendanceStatus>,
    pub time_in: Option<String>,
    pub notes: Option<String>,
}

pub async fn update_attendance(
    pool: &PgPool,
    student_id: Uuid,
    date: NaiveDate,
    update: &AttendanceUpdate,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE attendance_tracker.attendance
        SET status = COALESCE($3, status),
            time_in = COALESCE($4, time_in),
            notes = COALESCE($5, notes),
            updated_at = now()
        WHERE student_id = $1 AND date = $2
        "#,
    )
    .bind(student_id)
    .bind(date)
    .bind(update.status.as_ref().map(AttendanceStatus::as_str))
    .bind(&update.time_in)
    .bind(&update.notes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_attendance(
    pool: &PgPool,
    student_id: Uuid,
    date: NaiveDate,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM attendance_tracker.attendance WHERE student_id = $1 AND date = $2",
    )
    .bind(student_id)
    .bind(date)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Grades for one student, newest first. `grade_value` is read as float8.
pub async fn fetch_grades_by_student(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<GradeRecord>> {
    let rows = sqlx::query(
        "SELECT student_id, subject, grade_value::float8 AS grade_value, grade_type, \
         description, date, quarter \
         FROM attendance_tracker.grades \
         WHERE student_id = $1 \
         ORDER BY date DESC NULLS LAST",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    debug!(%student_id, count = rows.len(), "fetched grades");
    Ok(rows
        .iter()
        .map(|row| GradeRecord {
            student_id: row.get("student_id"),
            subject: row.get("subject"),
            grade_value: row.get("grade_value"),
            grade_type: row.get("grade_type"),
            description: row.get("description"),
            date: row.get("date"),
            quarter: row.get("quarter"),
        })
        .collect())
}

pub async fn insert_grade(pool: &PgPool, record: &GradeRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance_tracker.grades
        (id, student_id, subject, grade_value, grade_type, description, date, quarter)
        VALUES ($1, $2, $3, CAST($4 AS NUMERIC), $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.student_id)
    .bind(&record.subject)
    .bind(record.grade_value)
    .bind(&record.grade_type)
    .bind(&record.description)
    .bind(record.date)
    .bind(&record.quarter)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes one student's grades in a subject, narrowed by date and type when given.
pub async fn delete_grades(
    pool: &PgPool,
    student_id: Uuid,
    subject: &str,
    date: Option<NaiveDate>,
    grade_type: Option<&str>,
) -> anyhow::Result<u64> {
    let mut query = String::from(
        "DELETE FROM attendance_tracker.grades WHERE student_id = $1 AND subject = $2",
    );
    let mut next = 3;
    if date.is_some() {
        query.push_str(&format!(" AND date = ${next}"));
        next += 1;
    }
    if grade_type.is_some() {
        query.push_str(&format!(" AND grade_type = ${next}"));
    }

    let mut rows = sqlx::query(&query).bind(student_id).bind(subject);
    if let Some(value) = date {
        rows = rows.bind(value);
    }
    if let Some(value) = grade_type {
        rows = rows.bind(value);
    }

    let result = rows.execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn import_students_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut saved = 0usize;

    for result in reader.deserialize::<StudentInput>() {
        let row = result?;
        upsert_student(pool, Uuid::new_v4(), &row).await?;
        saved += 1;
    }

    info!(saved, path = %csv_path.display(), "imported students");
    Ok(saved)
}

/// Imports attendance rows, skipping any whose status is outside the known set.
/// A later row for the same student and day replaces an earlier one.
pub async fn import_attendance_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_number: String,
        date: NaiveDate,
        status: String,
        time_in: Option<String>,
        notes: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status = match AttendanceStatus::parse_known(&row.status) {
            Ok(status) => status,
            Err(err) => {
                warn!(student_number = %row.student_number, date = %row.date, "{err}");
                skipped += 1;
                continue;
            }
        };

        let record = AttendanceRecord {
            student_id: student_id_for(pool, &row.student_number).await?,
            date: row.date,
            status,
            time_in: row.time_in.filter(|t| !t.trim().is_empty()),
            notes: row.notes.filter(|n| !n.trim().is_empty()),
        };
        replace_attendance(pool, &record).await?;
        inserted += 1;
    }

    info!(inserted, skipped, path = %csv_path.display(), "imported attendance");
    Ok(inserted)
}

/// Imports grade rows. `grade_value` is read as text and coerced here.
pub async fn import_grades_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_number: String,
        subject: String,
        grade_value: String,
        grade_type: String,
        description: Option<String>,
        date: Option<NaiveDate>,
        quarter: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let grade_value = match parse_grade_value(&row.grade_value) {
            Ok(value) => value,
            Err(err) => {
                warn!(student_number = %row.student_number, subject = %row.subject, "{err}");
                skipped += 1;
                continue;
            }
        };

        let record = GradeRecord {
            student_id: student_id_for(pool, &row.student_number).await?,
            subject: row.subject,
            grade_value,
            grade_type: row.grade_type,
            description: row.description.filter(|d| !d.trim().is_empty()),
            date: row.date,
            quarter: row.quarter.filter(|q| !q.trim().is_empty()),
        };
        insert_grade(pool, &record).await?;
        inserted += 1;
    }

    info!(inserted, skipped, path = %csv_path.display(), "imported grades");
    Ok(inserted)
}
