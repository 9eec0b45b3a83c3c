use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{
    AttendanceRecord, AttendanceStats, AttendanceStatus, DailySnapshot, GradeRecord, GradeStats,
    SubjectGrades,
};

/// Counts attendance rows per status. Late arrivals count toward the rate.
pub fn compute_attendance_stats(records: &[AttendanceRecord]) -> AttendanceStats {
    let mut stats = AttendanceStats {
        total: records.len(),
        ..AttendanceStats::default()
    };

    for record in records {
        match record.status {
            AttendanceStatus::Present => stats.present += 1,
            AttendanceStatus::Absent => stats.absent += 1,
            AttendanceStatus::Late => stats.late += 1,
            AttendanceStatus::Excused => stats.excused += 1,
            AttendanceStatus::Unknown(_) => {}
        }
    }

    stats.rate = percentage(stats.present + stats.late, stats.total);
    stats
}

pub fn compute_grade_stats(records: &[GradeRecord]) -> GradeStats {
    let mut stats = GradeStats {
        total: records.len(),
        ..GradeStats::default()
    };
    let mut sum = 0.0;

    for record in records {
        sum += record.grade_value;
        let entry = stats
            .by_subject
            .entry(record.subject.clone())
            .or_default();
        entry.sum += record.grade_value;
        entry.count += 1;
    }

    for subject in stats.by_subject.values_mut() {
        subject.average = subject.sum / subject.count as f64;
    }

    stats.average = if stats.total == 0 {
        0.0
    } else {
        sum / stats.total as f64
    };
    stats
}

/// Roster-relative view of one day: the rate is present rows over roster size.
///
/// A student marked more than once counts once, with the last row in `records`
/// deciding their status.
pub fn compute_daily_snapshot(roster_size: usize, records: &[AttendanceRecord]) -> DailySnapshot {
    let mut latest: HashMap<Uuid, &AttendanceRecord> = HashMap::new();
    for record in records {
        latest.insert(record.student_id, record);
    }

    let mut snapshot = DailySnapshot {
        total_students: roster_size,
        unmarked: roster_size.saturating_sub(latest.len()),
        ..DailySnapshot::default()
    };

    for record in latest.values() {
        match record.status {
            AttendanceStatus::Present => snapshot.present += 1,
            AttendanceStatus::Absent => snapshot.absent += 1,
            AttendanceStatus::Late => snapshot.late += 1,
            AttendanceStatus::Excused => snapshot.excused += 1,
            AttendanceStatus::Unknown(_) => {}
        }
    }

    snapshot.rate = percentage(snapshot.present, roster_size);
    snapshot
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn attendance(status: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            status: AttendanceStatus::parse(status),
            time_in: None,
            notes: None,
        }
    }

    fn grade(subject: &str, value: f64) -> GradeRecord {
        GradeRecord {
            student_id: Uuid::nil(),
            subject: subject.to_string(),
            grade_value: value,
            grade_type: "quiz".to_string(),
            description: None,
            date: None,
            quarter: None,
        }
    }

    #[test]
    fn empty_inputs_produce_zeroed_stats() {
        assert_eq!(compute_attendance_stats(&[]), AttendanceStats::default());

        let grades = compute_grade_stats(&[]);
        assert_eq!(grades.total, 0);
        assert_eq!(grades.average, 0.0);
        assert!(grades.by_subject.is_empty());
    }

    #[test]
    fn late_counts_toward_rate() {
        let records = vec![
            attendance("present"),
            attendance("present"),
            attendance("late"),
            attendance("absent"),
        ];
        let stats = compute_attendance_stats(&records);
        assert_eq!(
            stats,
            AttendanceStats {
                total: 4,
                present: 2,
                absent: 1,
                late: 1,
                excused: 0,
                rate: 75.0,
            }
        );
    }

    #[test]
    fn unknown_status_only_counts_toward_total() {
        let records = vec![
            attendance("present"),
            attendance("tardy-excused"),
            attendance("present"),
            attendance("present"),
        ];
        let stats = compute_attendance_stats(&records);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.present, 3);
        assert_eq!(stats.absent + stats.late + stats.excused, 0);
        assert_eq!(stats.rate, 75.0);
    }

    #[test]
    fn duplicate_dates_are_not_collapsed() {
        let records = vec![attendance("present"), attendance("absent")];
        let stats = compute_attendance_stats(&records);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.rate, 50.0);
    }

    #[test]
    fn grades_group_by_exact_subject() {
        let records = vec![grade("Math", 80.0), grade("Math", 90.0), grade("Science", 70.0)];
        let stats = compute_grade_stats(&records);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.average, 80.0);
        assert_eq!(
            stats.by_subject["Math"],
            SubjectGrades {
                sum: 170.0,
                count: 2,
                average: 85.0
            }
        );
        assert_eq!(
            stats.by_subject["Science"],
            SubjectGrades {
                sum: 70.0,
                count: 1,
                average: 70.0
            }
        );
    }

    #[test]
    fn subject_labels_are_case_sensitive() {
        let stats = compute_grade_stats(&[grade("Math", 60.0), grade("math", 100.0)]);
        assert_eq!(stats.by_subject.len(), 2);
        assert_eq!(stats.by_subject["math"].average, 100.0);
    }

    #[test]
    fn daily_snapshot_uses_roster_size() {
        let records = vec![
            attendance_for(Uuid::new_v4(), "present"),
            attendance_for(Uuid::new_v4(), "late"),
            attendance_for(Uuid::new_v4(), "absent"),
        ];
        let snapshot = compute_daily_snapshot(4, &records);
        assert_eq!(snapshot.total_students, 4);
        assert_eq!(snapshot.present, 1);
        assert_eq!(snapshot.late, 1);
        assert_eq!(snapshot.unmarked, 1);
        assert_eq!(snapshot.rate, 25.0);
    }

    fn attendance_for(student_id: Uuid, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            student_id,
            ..attendance(status)
        }
    }

    #[test]
    fn remarked_student_counts_once_with_latest_status() {
        let first = Uuid::new_v4();
        let records = vec![
            attendance_for(first, "absent"),
            attendance_for(first, "present"),
        ];
        let snapshot = compute_daily_snapshot(2, &records);
        assert_eq!(snapshot.present, 1);
        assert_eq!(snapshot.absent, 0);
        assert_eq!(snapshot.unmarked, 1);
        assert_eq!(snapshot.rate, 50.0);

        let doubled = vec![attendance_for(first, "present"), attendance_for(first, "present")];
        let snapshot = compute_daily_snapshot(1, &doubled);
        assert_eq!(snapshot.present, 1);
        assert_eq!(snapshot.rate, 100.0);
    }

    #[test]
    fn daily_snapshot_with_empty_roster_is_zero() {
        let snapshot = compute_daily_snapshot(0, &[attendance("present")]);
        assert_eq!(snapshot.rate, 0.0);
        assert_eq!(snapshot.unmarked, 0);
    }

    fn status_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("present".to_string()),
            Just("absent".to_string()),
            Just("late".to_string()),
            Just("excused".to_string()),
            "[a-z-]{0,12}",
        ]
    }

    proptest! {
        #[test]
        fn category_counts_never_exceed_total(statuses in prop::collection::vec(status_strategy(), 0..64)) {
            let records: Vec<_> = statuses.iter().map(|s| attendance(s)).collect();
            let stats = compute_attendance_stats(&records);
            prop_assert_eq!(stats.total, records.len());
            prop_assert!(stats.present + stats.absent + stats.late + stats.excused <= stats.total);
            prop_assert!((0.0..=100.0).contains(&stats.rate));
        }

        #[test]
        fn attending_rows_never_lower_the_rate(
            statuses in prop::collection::vec(status_strategy(), 0..64),
            extra in prop_oneof![Just("present"), Just("late")],
        ) {
            let mut records: Vec<_> = statuses.iter().map(|s| attendance(s)).collect();
            let before = compute_attendance_stats(&records).rate;
            records.push(attendance(extra));
            let after = compute_attendance_stats(&records).rate;
            prop_assert!(after + 1e-9 >= before);
        }

        #[test]
        fn missed_rows_never_raise_the_rate(
            statuses in prop::collection::vec(status_strategy(), 0..64),
            extra in prop_oneof![Just("absent"), Just("excused")],
        ) {
            let mut records: Vec<_> = statuses.iter().map(|s| attendance(s)).collect();
            let before = compute_attendance_stats(&records).rate;
            records.push(attendance(extra));
            let after = compute_attendance_stats(&records).rate;
            prop_assert!(after <= before + 1e-9);
        }

        #[test]
        fn grade_average_is_order_independent(
            (rows, shuffled) in prop::collection::vec(
                (prop_oneof![Just("Math"), Just("Science"), Just("History")], 0u32..=100),
                1..48,
            )
            .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle())),
        ) {
            let records: Vec<_> = rows.iter().map(|(s, v)| grade(s, *v as f64)).collect();
            let reordered: Vec<_> = shuffled.iter().map(|(s, v)| grade(s, *v as f64)).collect();

            let forward = compute_grade_stats(&records);
            let backward = compute_grade_stats(&reordered);
            let sum: f64 = records.iter().map(|r| r.grade_value).sum();

            prop_assert_eq!(forward.total, records.len());
            prop_assert!((forward.average - backward.average).abs() < 1e-9);
            for (subject, summary) in &forward.by_subject {
                prop_assert_eq!(summary.count, backward.by_subject[subject].count);
                prop_assert!((summary.average - backward.by_subject[subject].average).abs() < 1e-9);
            }
            prop_assert!((forward.average - sum / records.len() as f64).abs() < 1e-9);
            prop_assert_eq!(
                forward.by_subject.values().map(|s| s.count).sum::<usize>(),
                forward.total
            );
        }
    }
}
