use std::fmt::Write;

use crate::catalog::SubjectCatalog;
use crate::engine::{self, EngineError};
use crate::models::{StudentRecords, StudentSummary};
use crate::scale::GradeScale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Standing {
    High,
    Good,
    Watch,
    NoData,
}

impl Standing {
    pub fn from_cgpa(cgpa: f64) -> Self {
        match cgpa {
            c if c >= 8.0 => Standing::High,
            c if c >= 6.5 => Standing::Good,
            c if c > 0.0 => Standing::Watch,
            _ => Standing::NoData,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Standing::High => "high",
            Standing::Good => "good",
            Standing::Watch => "watch",
            Standing::NoData => "no data",
        }
    }
}

pub fn summarize(
    records: &StudentRecords,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<StudentSummary, EngineError> {
    let result = engine::compute_results(&records.semesters, catalog, scale)?;
    Ok(StudentSummary {
        register_number: records.student.register_number.clone(),
        full_name: records.student.full_name.clone(),
        department: records.student.department.clone(),
        result,
        backlogs: engine::count_backlogs(&records.semesters, catalog, scale)?,
        arrears: engine::count_arrears(&records.semesters, catalog, scale)?,
    })
}

pub fn summarize_all(
    records: &[StudentRecords],
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<Vec<StudentSummary>, EngineError> {
    records
        .iter()
        .map(|record| summarize(record, catalog, scale))
        .collect()
}

pub fn build_report(
    batch: Option<&str>,
    scale: &GradeScale,
    summaries: &[StudentSummary],
) -> String {
    let mut output = String::new();
    let batch_label = batch.unwrap_or("all batches");

    let _ = writeln!(output, "# CGPA Report");
    let _ = writeln!(
        output,
        "Generated for {} using grade scale {}",
        batch_label,
        scale.version()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Standing Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students recorded for this batch.");
    } else {
        for standing in [
            Standing::High,
            Standing::Good,
            Standing::Watch,
            Standing::NoData,
        ] {
            let count = summaries
                .iter()
                .filter(|summary| Standing::from_cgpa(summary.result.cgpa) == standing)
                .count();
            let _ = writeln!(output, "- {}: {} students", standing.label(), count);
        }
    }

    let mut ranked: Vec<&StudentSummary> = summaries
        .iter()
        .filter(|summary| summary.result.cgpa > 0.0)
        .collect();
    ranked.sort_by(|a, b| {
        b.result
            .cgpa
            .partial_cmp(&a.result.cgpa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.register_number.cmp(&b.register_number))
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest CGPA");

    if ranked.is_empty() {
        let _ = writeln!(output, "No graded semesters in this batch.");
    } else {
        for summary in ranked.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) CGPA {} across {} credits",
                summary.full_name,
                summary.register_number,
                summary.department,
                engine::format_display(summary.result.cgpa),
                summary.result.total_credits
            );
        }
    }

    let flagged: Vec<&StudentSummary> = summaries
        .iter()
        .filter(|summary| summary.backlogs > 0 || summary.arrears > 0)
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Backlogs and Arrears");

    if flagged.is_empty() {
        let _ = writeln!(output, "No outstanding subjects.");
    } else {
        for summary in flagged {
            let _ = writeln!(
                output,
                "- {} ({}): {} backlogs, {} arrears",
                summary.full_name, summary.register_number, summary.backlogs, summary.arrears
            );
        }
    }

    output
}

/// Results sheet with one `SEM n` column per catalog semester.
pub fn export_csv(
    summaries: &[StudentSummary],
    semesters: u32,
    writer: impl std::io::Write,
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header = vec![
        "S.No.".to_string(),
        "Register No.".to_string(),
        "Name of the Student".to_string(),
    ];
    header.extend((1..=semesters).map(|semester| format!("SEM {semester}")));
    header.extend(
        ["CGPA", "Total Credits", "No. of Backlogs", "No. of Arrears"]
            .into_iter()
            .map(String::from),
    );
    writer.write_record(&header)?;

    for (index, summary) in summaries.iter().enumerate() {
        let mut record = vec![
            (index + 1).to_string(),
            summary.register_number.clone(),
            summary.full_name.clone(),
        ];
        record.extend((1..=semesters).map(|semester| {
            summary
                .result
                .semester_gpa
                .get(&semester)
                .map(|gpa| engine::format_or_na(*gpa))
                .unwrap_or_else(|| "N/A".to_string())
        }));
        record.push(engine::format_or_na(summary.result.cgpa));
        record.push(summary.result.total_credits.to_string());
        record.push(summary.backlogs.to_string());
        record.push(summary.arrears.to_string());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradeSelections, Role, SemesterRecord, Student, SubjectCatalogEntry};
    use chrono::Utc;
    use uuid::Uuid;

    fn catalog() -> SubjectCatalog {
        let subject = |semester: u32, code: &str, credits: u32| SubjectCatalogEntry {
            semester,
            code: code.to_string(),
            name: code.to_string(),
            credits,
        };
        SubjectCatalog::from_entries(vec![
            subject(1, "E101", 3),
            subject(1, "M101", 4),
            subject(2, "M201", 4),
            subject(2, "P201", 3),
        ])
        .unwrap()
    }

    fn records(
        register_number: &str,
        name: &str,
        semesters: Vec<SemesterRecord>,
    ) -> StudentRecords {
        StudentRecords {
            student: Student {
                id: Uuid::new_v4(),
                register_number: register_number.to_string(),
                full_name: name.to_string(),
                email: format!("{register_number}@example.edu"),
                batch: "2024-2028".to_string(),
                department: "CSE".to_string(),
                role: Role::User,
                created_at: Utc::now(),
            },
            semesters,
        }
    }

    fn semester(number: u32, pairs: &[(&str, &str)]) -> SemesterRecord {
        let grades: GradeSelections = pairs
            .iter()
            .map(|(code, grade)| (code.to_string(), grade.to_string()))
            .collect();
        SemesterRecord::new(number, grades)
    }

    fn summaries() -> Vec<StudentSummary> {
        let scale = GradeScale::builtin().unwrap();
        let all = vec![
            records(
                "R1",
                "Avery Lee",
                vec![
                    semester(1, &[("E101", "O"), ("M101", "A+")]),
                    semester(2, &[("M201", "A"), ("P201", "O")]),
                ],
            ),
            records(
                "R2",
                "Jules Moreno",
                vec![semester(1, &[("E101", "B"), ("M101", "U")])],
            ),
            records("R3", "Kiara Patel", vec![]),
        ];
        summarize_all(&all, &catalog(), &scale).unwrap()
    }

    #[test]
    fn standing_bands_follow_thresholds() {
        assert_eq!(Standing::from_cgpa(9.2), Standing::High);
        assert_eq!(Standing::from_cgpa(8.0), Standing::High);
        assert_eq!(Standing::from_cgpa(7.99), Standing::Good);
        assert_eq!(Standing::from_cgpa(6.5), Standing::Good);
        assert_eq!(Standing::from_cgpa(4.0), Standing::Watch);
        assert_eq!(Standing::from_cgpa(0.0), Standing::NoData);
    }

    #[test]
    fn summaries_carry_engine_results() {
        let summaries = summaries();
        // sem 1: (30 + 36) / 7 = 9.43, sem 2: (32 + 30) / 7 = 8.86
        assert_eq!(summaries[0].result.semester_gpa.get(&1), Some(&9.43));
        assert_eq!(summaries[0].result.semester_gpa.get(&2), Some(&8.86));
        assert_eq!(summaries[0].result.cgpa, 9.15);
        assert_eq!(summaries[0].result.total_credits, 14);

        // U earns credits at zero points: 18 / 7
        assert_eq!(summaries[1].result.cgpa, 2.57);
        assert_eq!(summaries[1].backlogs, 1);
        assert_eq!(summaries[1].arrears, 0);

        assert_eq!(summaries[2].result.cgpa, 0.0);
        assert_eq!(summaries[2].result.total_credits, 0);
    }

    #[test]
    fn report_ranks_and_flags_students() {
        let scale = GradeScale::builtin().unwrap();
        let report = build_report(Some("2024-2028"), &scale, &summaries());

        assert!(report.contains("Generated for 2024-2028 using grade scale 2021-regulation"));
        assert!(report.contains("- high: 1 students"));
        assert!(report.contains("- watch: 1 students"));
        assert!(report.contains("- no data: 1 students"));
        assert!(report.contains("- Avery Lee (R1, CSE) CGPA 9.15 across 14 credits"));
        assert!(report.contains("- Jules Moreno (R2): 1 backlogs, 0 arrears"));
        assert!(!report.contains("Kiara Patel (R3, CSE)"));

        let avery = report.find("Avery Lee (R1").unwrap();
        let jules = report.find("Jules Moreno (R2, CSE)").unwrap();
        assert!(avery < jules);
    }

    #[test]
    fn empty_report_says_so() {
        let scale = GradeScale::builtin().unwrap();
        let report = build_report(None, &scale, &[]);
        assert!(report.contains("all batches"));
        assert!(report.contains("No students recorded for this batch."));
        assert!(report.contains("No graded semesters in this batch."));
        assert!(report.contains("No outstanding subjects."));
    }

    #[test]
    fn export_writes_one_column_per_semester() {
        let mut buffer = Vec::new();
        export_csv(&summaries(), 2, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "S.No.,Register No.,Name of the Student,SEM 1,SEM 2,CGPA,Total Credits,No. of Backlogs,No. of Arrears"
        );
        assert_eq!(lines[1], "1,R1,Avery Lee,9.43,8.86,9.15,14,0,0");
        assert_eq!(lines[2], "2,R2,Jules Moreno,2.57,N/A,2.57,7,1,0");
        assert_eq!(lines[3], "3,R3,Kiara Patel,N/A,N/A,N/A,0,0,0");
    }
}
