use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subject code to grade token. An empty token means the subject is ungraded.
pub type GradeSelections = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCatalogEntry {
    pub semester: u32,
    pub code: String,
    pub name: String,
    pub credits: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemesterRecord {
    pub semester: u32,
    pub grades: GradeSelections,
}

impl SemesterRecord {
    pub fn new(semester: u32, grades: GradeSelections) -> Self {
        Self { semester, grades }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SemesterGpa {
    pub gpa: f64,
    pub total_credits: u32,
    pub total_points: f64,
}

/// Derived on demand from [`SemesterRecord`]s; never stored as the source of truth.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComputedResult {
    pub semester_gpa: BTreeMap<u32, f64>,
    pub semester_credits: BTreeMap<u32, u32>,
    pub cgpa: f64,
    pub total_credits: u32,
}

impl ComputedResult {
    /// Semesters that produced a positive GPA.
    pub fn completed_semesters(&self) -> usize {
        self.semester_gpa.values().filter(|gpa| **gpa > 0.0).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub register_number: String,
    pub full_name: String,
    pub email: String,
    pub batch: String,
    pub department: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub register_number: String,
    pub full_name: String,
    pub email: String,
    pub batch: String,
    pub department: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CgpaSnapshot {
    pub cgpa: f64,
    pub completed_semesters: i32,
    pub recorded_at: DateTime<Utc>,
}

/// A learner together with their stored semester records.
#[derive(Debug, Clone)]
pub struct StudentRecords {
    pub student: Student,
    pub semesters: Vec<SemesterRecord>,
}

/// One row of the admin view: a learner plus everything the engine derived.
#[derive(Debug, Clone)]
pub struct StudentSummary {
    pub register_number: String,
    pub full_name: String,
    pub department: String,
    pub result: ComputedResult,
    pub backlogs: usize,
    pub arrears: usize,
}

#[derive(Debug, Clone)]
pub struct BatchCount {
    pub batch: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct StudentStats {
    pub total: i64,
    pub recent: i64,
    pub by_batch: Vec<BatchCount>,
}
