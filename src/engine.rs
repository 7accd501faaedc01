//! GPA and CGPA computation.
//!
//! Every function here is pure: the scale and catalog are read-only inputs and
//! nothing is cached between calls. Unrecognised subject codes and grade tokens
//! are skipped so partially filled semesters still compute; only a semester
//! the catalog does not know about is reported as an error.

use std::collections::BTreeMap;

use tracing::trace;

use crate::catalog::SubjectCatalog;
use crate::models::{ComputedResult, GradeSelections, SemesterGpa, SemesterRecord};
use crate::scale::GradeScale;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("semester {0} is not in the subject catalog")]
    UnknownSemester(u32),
}

/// Point value of `grade`, or 0 when the token is blank or not on the scale.
pub fn grade_to_point(grade: &str, scale: &GradeScale) -> f64 {
    scale.point(grade).unwrap_or(0.0)
}

/// Rounds half-up to two decimals.
///
/// The value is first snapped to nine decimals so that quotients such as
/// 7.005, stored as 7.00499999..., round the way their decimal form reads.
pub fn round2(value: f64) -> f64 {
    let snapped = (value * 1e9).round() / 1e7;
    snapped.round() / 100.0
}

pub fn format_display(value: f64) -> String {
    format!("{:.2}", value)
}

/// Like [`format_display`], but renders the "no credits earned" zero as `N/A`.
pub fn format_or_na(value: f64) -> String {
    if value > 0.0 {
        format_display(value)
    } else {
        "N/A".to_string()
    }
}

pub fn compute_semester_gpa(
    semester: u32,
    grades: &GradeSelections,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<SemesterGpa, EngineError> {
    if catalog.subjects(semester).is_none() {
        return Err(EngineError::UnknownSemester(semester));
    }

    let mut total_credits = 0u32;
    let mut total_points = 0.0;

    for (code, grade) in grades {
        if grade.is_empty() {
            continue;
        }
        let Some(points) = scale.point(grade) else {
            trace!(semester, code = %code, grade = %grade, "skipping grade not on scale");
            continue;
        };
        let Some(subject) = catalog.find(semester, code) else {
            trace!(semester, code = %code, "skipping subject not offered this semester");
            continue;
        };

        total_credits += subject.credits;
        total_points += points * f64::from(subject.credits);
    }

    let gpa = if total_credits > 0 {
        round2(total_points / f64::from(total_credits))
    } else {
        0.0
    };

    Ok(SemesterGpa {
        gpa,
        total_credits,
        total_points,
    })
}

/// Credit-weighted mean of already computed semester GPAs.
///
/// Each semester is weighted by the credits its own grades earn, re-derived
/// from `grades_by_semester`, so a semester that was entered but left ungraded
/// carries no weight.
pub fn compute_cgpa(
    semester_gpas: &BTreeMap<u32, f64>,
    grades_by_semester: &BTreeMap<u32, GradeSelections>,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<f64, EngineError> {
    let mut total_credits = 0u32;
    let mut total_points = 0.0;

    for (semester, gpa) in semester_gpas {
        if *gpa <= 0.0 {
            continue;
        }
        let Some(grades) = grades_by_semester.get(semester) else {
            continue;
        };

        let earned = compute_semester_gpa(*semester, grades, catalog, scale)?.total_credits;
        if earned == 0 {
            continue;
        }

        total_credits += earned;
        total_points += gpa * f64::from(earned);
    }

    Ok(if total_credits > 0 {
        round2(total_points / f64::from(total_credits))
    } else {
        0.0
    })
}

/// Resolves resaves: the last record for a semester replaces any earlier one.
pub fn latest_by_semester(records: &[SemesterRecord]) -> BTreeMap<u32, GradeSelections> {
    let mut latest = BTreeMap::new();
    for record in records {
        latest.insert(record.semester, record.grades.clone());
    }
    latest
}

pub fn compute_results(
    records: &[SemesterRecord],
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<ComputedResult, EngineError> {
    let mut grades_by_semester = latest_by_semester(records);
    grades_by_semester.retain(|_, grades| !grades.is_empty());

    let mut result = ComputedResult::default();

    for (semester, grades) in &grades_by_semester {
        let computed = compute_semester_gpa(*semester, grades, catalog, scale)?;
        result.semester_gpa.insert(*semester, computed.gpa);
        result
            .semester_credits
            .insert(*semester, computed.total_credits);
        if computed.gpa > 0.0 {
            result.total_credits += computed.total_credits;
        }
    }

    result.cgpa = compute_cgpa(&result.semester_gpa, &grades_by_semester, catalog, scale)?;
    Ok(result)
}

/// Catalog subjects graded with a zero-point token.
pub fn count_backlogs(
    records: &[SemesterRecord],
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<usize, EngineError> {
    let mut backlogs = 0;
    for (semester, grades) in latest_by_semester(records) {
        if grades.is_empty() {
            continue;
        }
        let subjects = catalog
            .subjects(semester)
            .ok_or(EngineError::UnknownSemester(semester))?;
        backlogs += subjects
            .iter()
            .filter(|subject| {
                grades
                    .get(&subject.code)
                    .and_then(|grade| scale.point(grade))
                    .is_some_and(|points| points == 0.0)
            })
            .count();
    }
    Ok(backlogs)
}

/// Catalog subjects of an entered semester that still lack a recognised grade.
pub fn count_arrears(
    records: &[SemesterRecord],
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> Result<usize, EngineError> {
    let mut arrears = 0;
    for (semester, grades) in latest_by_semester(records) {
        if grades.is_empty() {
            continue;
        }
        let subjects = catalog
            .subjects(semester)
            .ok_or(EngineError::UnknownSemester(semester))?;
        arrears += subjects
            .iter()
            .filter(|subject| {
                grades
                    .get(&subject.code)
                    .and_then(|grade| scale.point(grade))
                    .is_none()
            })
            .count();
    }
    Ok(arrears)
}
