use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use crate::models::SubjectCatalogEntry;

/// Upper bound on a single subject's credit weight.
pub const MAX_SUBJECT_CREDITS: u32 = 100;

const DEFAULT_CATALOG: &str = include_str!("../data/catalog.csv");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("subject `{code}` is listed under semester 0; semesters start at 1")]
    InvalidSemester { code: String },
    #[error("subject `{code}` has non-positive credits")]
    InvalidCredits { code: String },
    #[error("subject `{code}` has {credits} credits; at most {max} are allowed", max = MAX_SUBJECT_CREDITS)]
    ExcessiveCredits { code: String, credits: u32 },
    #[error("subject code `{code}` appears more than once")]
    DuplicateCode { code: String },
    #[error("subject code is blank in semester {semester}")]
    BlankCode { semester: u32 },
    #[error("catalog has no subjects")]
    Empty,
    #[error("failed to read catalog: {0}")]
    Csv(#[from] csv::Error),
}

/// Subjects offered per semester, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectCatalog {
    semesters: BTreeMap<u32, Vec<SubjectCatalogEntry>>,
}

impl SubjectCatalog {
    pub fn from_entries(entries: Vec<SubjectCatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        let mut semesters: BTreeMap<u32, Vec<SubjectCatalogEntry>> = BTreeMap::new();

        for entry in entries {
            if entry.code.trim().is_empty() {
                return Err(CatalogError::BlankCode {
                    semester: entry.semester,
                });
            }
            if entry.semester == 0 {
                return Err(CatalogError::InvalidSemester { code: entry.code });
            }
            if entry.credits == 0 {
                return Err(CatalogError::InvalidCredits { code: entry.code });
            }
            if entry.credits > MAX_SUBJECT_CREDITS {
                return Err(CatalogError::ExcessiveCredits {
                    code: entry.code,
                    credits: entry.credits,
                });
            }
            if !seen.insert(entry.code.clone()) {
                return Err(CatalogError::DuplicateCode { code: entry.code });
            }
            semesters.entry(entry.semester).or_default().push(entry);
        }

        Ok(Self { semesters })
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let entries = reader
            .deserialize::<SubjectCatalogEntry>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_entries(entries)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file)
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_reader(DEFAULT_CATALOG.as_bytes())
    }

    pub fn subjects(&self, semester: u32) -> Option<&[SubjectCatalogEntry]> {
        self.semesters.get(&semester).map(Vec::as_slice)
    }

    pub fn find(&self, semester: u32, code: &str) -> Option<&SubjectCatalogEntry> {
        self.subjects(semester)?
            .iter()
            .find(|subject| subject.code == code)
    }

    pub fn semesters(&self) -> impl Iterator<Item = u32> + '_ {
        self.semesters.keys().copied()
    }

    pub fn semester_count(&self) -> u32 {
        self.semesters.keys().next_back().copied().unwrap_or(0)
    }

    pub fn semester_credits(&self, semester: u32) -> u32 {
        self.subjects(semester)
            .map(|subjects| subjects.iter().map(|subject| subject.credits).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(semester: u32, code: &str, credits: u32) -> SubjectCatalogEntry {
        SubjectCatalogEntry {
            semester,
            code: code.to_string(),
            name: format!("{code} subject"),
            credits,
        }
    }

    #[test]
    fn groups_subjects_by_semester_in_order() {
        let catalog = SubjectCatalog::from_entries(vec![
            entry(3, "M301", 4),
            entry(1, "E101", 3),
            entry(3, "P301", 3),
        ])
        .unwrap();

        let codes: Vec<&str> = catalog
            .subjects(3)
            .unwrap()
            .iter()
            .map(|subject| subject.code.as_str())
            .collect();
        assert_eq!(codes, vec!["M301", "P301"]);
        assert_eq!(catalog.semesters().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(catalog.semester_count(), 3);
        assert_eq!(catalog.semester_credits(3), 7);
        assert!(catalog.subjects(2).is_none());
        assert!(catalog.find(1, "M301").is_none());
        assert_eq!(catalog.find(3, "P301").map(|s| s.credits), Some(3));
    }

    #[test]
    fn rejects_zero_credits() {
        let err = SubjectCatalog::from_entries(vec![entry(1, "E101", 0)]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCredits { ref code } if code == "E101"));
    }

    #[test]
    fn rejects_credits_that_could_overflow_totals() {
        let err = SubjectCatalog::from_entries(vec![
            entry(1, "E101", 3_000_000_000),
            entry(1, "E102", 3_000_000_000),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ExcessiveCredits { ref code, credits: 3_000_000_000 } if code == "E101"
        ));

        let catalog = SubjectCatalog::from_entries(vec![entry(1, "E101", MAX_SUBJECT_CREDITS)])
            .unwrap();
        assert_eq!(catalog.semester_credits(1), MAX_SUBJECT_CREDITS);
    }

    #[test]
    fn rejects_semester_zero() {
        let err = SubjectCatalog::from_entries(vec![entry(0, "E101", 3)]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSemester { .. }));
    }

    #[test]
    fn rejects_duplicate_codes_across_semesters() {
        let err = SubjectCatalog::from_entries(vec![entry(1, "E101", 3), entry(2, "E101", 3)])
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateCode { .. }));
    }

    #[test]
    fn rejects_non_numeric_credits() {
        let raw = "semester,code,name,credits\n1,E101,English,three\n";
        let err = SubjectCatalog::from_reader(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, CatalogError::Csv(_)));
    }

    #[test]
    fn builtin_catalog_covers_eight_semesters() {
        let catalog = SubjectCatalog::builtin().unwrap();
        assert_eq!(catalog.semester_count(), 8);
        assert_eq!(catalog.find(1, "MA3151").map(|s| s.credits), Some(4));
        assert_eq!(catalog.find(8, "CS3811").map(|s| s.credits), Some(10));
    }
}
