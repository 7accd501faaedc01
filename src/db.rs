use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::catalog::SubjectCatalog;
use crate::engine::{self, EngineError};
use crate::models::{
    BatchCount, CgpaSnapshot, ComputedResult, GradeSelections, NewStudent, Role, SemesterRecord,
    Student, StudentRecords, StudentStats,
};
use crate::scale::GradeScale;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(
    pool: &PgPool,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> anyhow::Result<()> {
    let students = vec![
        (
            NewStudent {
                register_number: "312224104001".to_string(),
                full_name: "Aarav Menon".to_string(),
                email: "aarav.menon@example.edu".to_string(),
                batch: "2024-2028".to_string(),
                department: "CSE".to_string(),
            },
            vec![
                (
                    1,
                    vec![
                        ("HS3151", "A+"),
                        ("MA3151", "A"),
                        ("PH3151", "B+"),
                        ("CY3151", "A"),
                        ("GE3151", "O"),
                        ("GE3171", "O"),
                        ("BS3171", "A+"),
                    ],
                ),
                (
                    2,
                    vec![
                        ("HS3251", "A"),
                        ("MA3251", "B+"),
                        ("PH3256", "A"),
                        ("BE3251", "B"),
                        ("GE3251", "A+"),
                        ("CS3251", "O"),
                        ("CS3271", "O"),
                    ],
                ),
            ],
        ),
        (
            NewStudent {
                register_number: "312224104002".to_string(),
                full_name: "Divya Raman".to_string(),
                email: "divya.raman@example.edu".to_string(),
                batch: "2024-2028".to_string(),
                department: "CSE".to_string(),
            },
            vec![(
                1,
                vec![
                    ("HS3151", "B"),
                    ("MA3151", "U"),
                    ("PH3151", "C"),
                    ("CY3151", "B+"),
                    ("GE3151", "A"),
                    ("GE3171", "A+"),
                    ("BS3171", ""),
                ],
            )],
        ),
        (
            NewStudent {
                register_number: "312225104001".to_string(),
                full_name: "Karthik Iyer".to_string(),
                email: "karthik.iyer@example.edu".to_string(),
                batch: "2025-2029".to_string(),
                department: "IT".to_string(),
            },
            vec![],
        ),
    ];

    for (student, semesters) in students {
        let student_id = upsert_student(pool, &student).await?;
        for (semester, grades) in semesters {
            let grades: GradeSelections = grades
                .into_iter()
                .map(|(code, grade)| (code.to_string(), grade.to_string()))
                .collect();
            save_semester(
                pool,
                student_id,
                &SemesterRecord::new(semester, grades),
                catalog,
                scale,
            )
            .await?;
        }
    }

    Ok(())
}

pub async fn upsert_student(pool: &PgPool, student: &NewStudent) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO cgpa_tracker.students
        (id, register_number, full_name, email, batch, department)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (register_number) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            email = EXCLUDED.email,
            batch = EXCLUDED.batch,
            department = EXCLUDED.department
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&student.register_number)
    .bind(&student.full_name)
    .bind(student.email.to_lowercase())
    .bind(&student.batch)
    .bind(&student.department)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to register {}", student.register_number))?
    .get("id");

    info!(register_number = %student.register_number, %id, "student registered");
    Ok(id)
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<Student> {
    let role: String = row.get("role");
    Ok(Student {
        id: row.get("id"),
        register_number: row.get("register_number"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        batch: row.get("batch"),
        department: row.get("department"),
        role: Role::parse(&role).with_context(|| format!("unknown role `{role}`"))?,
        created_at: row.get("created_at"),
    })
}

pub async fn find_student(
    pool: &PgPool,
    register_number: &str,
) -> anyhow::Result<Option<Student>> {
    let row = sqlx::query(
        r#"
        SELECT id, register_number, full_name, email, batch, department, role, created_at
        FROM cgpa_tracker.students
        WHERE register_number = $1
        "#,
    )
    .bind(register_number)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(student_from_row).transpose()
}

fn semester_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<SemesterRecord> {
    let semester: i32 = row.get("semester");
    let Json(grades): Json<GradeSelections> = row.get("grades");
    Ok(SemesterRecord {
        semester: u32::try_from(semester).context("stored semester is negative")?,
        grades,
    })
}

pub async fn fetch_semesters<'e>(
    executor: impl PgExecutor<'e>,
    student_id: Uuid,
) -> anyhow::Result<Vec<SemesterRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT semester, grades
        FROM cgpa_tracker.semester_records
        WHERE student_id = $1
        ORDER BY semester
        "#,
    )
    .bind(student_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(semester_from_row).collect()
}

/// Replaces the stored record for `record.semester` and appends a CGPA snapshot.
///
/// The student row is locked for the duration so concurrent saves for one
/// learner apply one at a time.
pub async fn save_semester(
    pool: &PgPool,
    student_id: Uuid,
    record: &SemesterRecord,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> anyhow::Result<ComputedResult> {
    engine::compute_semester_gpa(record.semester, &record.grades, catalog, scale)?;
    let semester = i32::try_from(record.semester).context("semester number out of range")?;

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM cgpa_tracker.students WHERE id = $1 FOR UPDATE")
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?
        .context("student not found")?;

    sqlx::query(
        r#"
        INSERT INTO cgpa_tracker.semester_records (student_id, semester, grades, updated_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (student_id, semester) DO UPDATE
        SET grades = EXCLUDED.grades, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(student_id)
    .bind(semester)
    .bind(Json(&record.grades))
    .execute(&mut *tx)
    .await?;

    let semesters = fetch_semesters(&mut *tx, student_id).await?;
    let result = engine::compute_results(&semesters, catalog, scale)?;

    if result.cgpa > 0.0 {
        sqlx::query(
            r#"
            INSERT INTO cgpa_tracker.cgpa_history (id, student_id, cgpa, completed_semesters)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(result.cgpa)
        .bind(i32::try_from(result.completed_semesters())?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        %student_id,
        semester = record.semester,
        cgpa = result.cgpa,
        "semester saved"
    );
    Ok(result)
}

pub async fn fetch_cgpa_history(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<CgpaSnapshot>> {
    let rows = sqlx::query(
        r#"
        SELECT cgpa, completed_semesters, recorded_at
        FROM cgpa_tracker.cgpa_history
        WHERE student_id = $1
        ORDER BY recorded_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CgpaSnapshot {
            cgpa: row.get("cgpa"),
            completed_semesters: row.get("completed_semesters"),
            recorded_at: row.get("recorded_at"),
        })
        .collect())
}

/// Learners (admins excluded) with their semester records, ordered by register number.
pub async fn fetch_student_records(
    pool: &PgPool,
    batch: Option<&str>,
) -> anyhow::Result<Vec<StudentRecords>> {
    let mut query = String::from(
        "SELECT id, register_number, full_name, email, batch, department, role, created_at \
         FROM cgpa_tracker.students \
         WHERE role = 'user'",
    );
    if batch.is_some() {
        query.push_str(" AND batch = $1");
    }
    query.push_str(" ORDER BY register_number");

    let mut rows = sqlx::query(&query);
    if let Some(value) = batch {
        rows = rows.bind(value);
    }
    let students = rows
        .fetch_all(pool)
        .await?
        .iter()
        .map(student_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let ids: Vec<Uuid> = students.iter().map(|student| student.id).collect();
    let semester_rows = sqlx::query(
        r#"
        SELECT student_id, semester, grades
        FROM cgpa_tracker.semester_records
        WHERE student_id = ANY($1)
        ORDER BY semester
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_student: HashMap<Uuid, Vec<SemesterRecord>> = HashMap::new();
    for row in &semester_rows {
        let student_id: Uuid = row.get("student_id");
        by_student
            .entry(student_id)
            .or_default()
            .push(semester_from_row(row)?);
    }

    Ok(students
        .into_iter()
        .map(|student| {
            let semesters = by_student.remove(&student.id).unwrap_or_default();
            StudentRecords { student, semesters }
        })
        .collect())
}

pub async fn fetch_stats(pool: &PgPool) -> anyhow::Result<StudentStats> {
    let since = Utc::now() - Duration::days(30);
    let counts = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE created_at >= $1) AS recent
        FROM cgpa_tracker.students
        WHERE role = 'user'
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    let by_batch = sqlx::query(
        r#"
        SELECT batch, COUNT(*) AS count
        FROM cgpa_tracker.students
        WHERE role = 'user'
        GROUP BY batch
        ORDER BY batch
        "#,
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| BatchCount {
        batch: row.get("batch"),
        count: row.get("count"),
    })
    .collect();

    Ok(StudentStats {
        total: counts.get("total"),
        recent: counts.get("recent"),
        by_batch,
    })
}

pub async fn delete_student(pool: &PgPool, register_number: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM cgpa_tracker.students WHERE register_number = $1")
        .bind(register_number)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_role(
    pool: &PgPool,
    register_number: &str,
    role: Role,
) -> anyhow::Result<bool> {
    let result =
        sqlx::query("UPDATE cgpa_tracker.students SET role = $2 WHERE register_number = $1")
            .bind(register_number)
            .bind(role.as_str())
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, serde::Deserialize)]
struct ImportRow {
    register_number: String,
    full_name: String,
    email: String,
    batch: String,
    department: String,
    semester: u32,
    code: String,
    #[serde(default)]
    grade: String,
}

type ImportGroups = BTreeMap<String, (NewStudent, BTreeMap<u32, GradeSelections>)>;

fn group_import_rows(reader: impl std::io::Read) -> anyhow::Result<ImportGroups> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut groups: ImportGroups = BTreeMap::new();

    for result in reader.deserialize::<ImportRow>() {
        let row = result?;
        let (_, semesters) = groups
            .entry(row.register_number.clone())
            .or_insert_with(|| {
                (
                    NewStudent {
                        register_number: row.register_number.clone(),
                        full_name: row.full_name.clone(),
                        email: row.email.clone(),
                        batch: row.batch.clone(),
                        department: row.department.clone(),
                    },
                    BTreeMap::new(),
                )
            });
        semesters
            .entry(row.semester)
            .or_default()
            .insert(row.code, row.grade);
    }

    Ok(groups)
}

/// Checks every (learner, semester) group against the catalog so an import
/// either writes all of its groups or none of them.
fn validate_import_groups(groups: &ImportGroups, catalog: &SubjectCatalog) -> anyhow::Result<()> {
    for (register_number, (_, semesters)) in groups {
        for semester in semesters.keys() {
            if catalog.subjects(*semester).is_none() {
                return Err(EngineError::UnknownSemester(*semester))
                    .with_context(|| format!("import row for {register_number} is invalid"));
            }
        }
    }
    Ok(())
}

/// Imports grades from CSV. Each (learner, semester) group in the file
/// supersedes that learner's stored semester. Returns the number of semesters saved.
pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let groups = group_import_rows(file)?;
    validate_import_groups(&groups, catalog)?;
    let mut saved = 0usize;

    for (student, semesters) in groups.into_values() {
        let student_id = upsert_student(pool, &student).await?;
        for (semester, grades) in semesters {
            save_semester(
                pool,
                student_id,
                &SemesterRecord::new(semester, grades),
                catalog,
                scale,
            )
            .await?;
            saved += 1;
        }
    }

    Ok(saved)
}
