use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Externally shared application identifier, e.g. `APP20261014093015A1B2C3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub const PREFIX: &'static str = "APP";
    pub const TIMESTAMP_LEN: usize = 14;
    pub const SUFFIX_LEN: usize = 6;

    /// Accept only identifiers with the generated shape so they are safe to use as a
    /// storage directory name.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(Self::PREFIX)?;
        if !rest.is_ascii() || rest.len() != Self::TIMESTAMP_LEN + Self::SUFFIX_LEN {
            return None;
        }
        let (timestamp, suffix) = rest.split_at(Self::TIMESTAMP_LEN);
        let timestamp_ok = timestamp.bytes().all(|b| b.is_ascii_digit());
        let suffix_ok = suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
        (timestamp_ok && suffix_ok).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Published program catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    ComputerScience,
    Engineering,
    Business,
    Arts,
    Science,
}

impl Program {
    pub const ALL: [Program; 5] = [
        Program::ComputerScience,
        Program::Engineering,
        Program::Business,
        Program::Arts,
        Program::Science,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Program::ComputerScience => "computer_science",
            Program::Engineering => "engineering",
            Program::Business => "business",
            Program::Arts => "arts",
            Program::Science => "science",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Program::ComputerScience => "Computer Science",
            Program::Engineering => "Engineering",
            Program::Business => "Business Administration",
            Program::Arts => "Arts and Humanities",
            Program::Science => "Natural Sciences",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|program| program.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Purpose of a stored file. Storage names are derived from the role, never from the
/// uploaded file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    DegreeCertificate,
    IdProof,
    AdmissionLetter,
}

impl DocumentRole {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentRole::DegreeCertificate => "degree_certificate",
            DocumentRole::IdProof => "id_proof",
            DocumentRole::AdmissionLetter => "admission_letter",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "degree_certificate" => Some(Self::DegreeCertificate),
            "id_proof" => Some(Self::IdProof),
            "admission_letter" => Some(Self::AdmissionLetter),
            _ => None,
        }
    }
}

/// Opaque handle to a file persisted by a [`DocumentStore`](super::documents::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredRef(pub String);

impl StoredRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
}

impl ApplicantDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicDetails {
    pub program: Program,
    pub previous_education: String,
    pub gpa: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedDocuments {
    pub degree_certificate: StoredRef,
    pub id_proof: StoredRef,
}

/// Everything the store needs to create a row; the store assigns the row id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub application_id: ApplicationId,
    pub applicant: ApplicantDetails,
    pub academic: AcademicDetails,
    pub documents: SubmittedDocuments,
    pub submitted_at: DateTime<Utc>,
}

/// A persisted application and its review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: i64,
    pub application_id: ApplicationId,
    pub applicant: ApplicantDetails,
    pub academic: AcademicDetails,
    pub documents: SubmittedDocuments,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    /// Only ever set when `status` is `Approved`.
    pub admission_letter: Option<StoredRef>,
}

impl ApplicationRecord {
    pub fn from_new(id: i64, application: NewApplication) -> Self {
        Self {
            id,
            application_id: application.application_id,
            applicant: application.applicant,
            academic: application.academic,
            documents: application.documents,
            status: ApplicationStatus::Pending,
            submitted_at: application.submitted_at,
            reviewed_at: None,
            reviewed_by: None,
            admission_letter: None,
        }
    }

    pub fn document(&self, role: DocumentRole) -> Option<&StoredRef> {
        match role {
            DocumentRole::DegreeCertificate => Some(&self.documents.degree_certificate),
            DocumentRole::IdProof => Some(&self.documents.id_proof),
            DocumentRole::AdmissionLetter => self.admission_letter.as_ref(),
        }
    }
}

/// Outcome written by a review. Approval always carries the letter reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approved { letter: StoredRef },
    Rejected,
}

impl ReviewOutcome {
    pub const fn status(&self) -> ApplicationStatus {
        match self {
            ReviewOutcome::Approved { .. } => ApplicationStatus::Approved,
            ReviewOutcome::Rejected => ApplicationStatus::Rejected,
        }
    }

    pub fn letter(&self) -> Option<&StoredRef> {
        match self {
            ReviewOutcome::Approved { letter } => Some(letter),
            ReviewOutcome::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    pub application_id: ApplicationId,
    pub outcome: ReviewOutcome,
    pub reviewer: String,
    pub reviewed_at: DateTime<Utc>,
}

/// Sort order for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOrder {
    #[default]
    Newest,
    Oldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationQuery {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub order: SubmissionOrder,
}

impl ApplicationQuery {
    pub fn with_status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            order: SubmissionOrder::Newest,
        }
    }

    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        self.status.map_or(true, |status| record.status == status)
    }

    /// Newest-first ordering with the row id as tie breaker.
    pub fn sort(&self, records: &mut [ApplicationRecord]) {
        records.sort_by(|a, b| {
            let newest_first = b
                .submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.id.cmp(&a.id));
            match self.order {
                SubmissionOrder::Newest => newest_first,
                SubmissionOrder::Oldest => newest_first.reverse(),
            }
        });
    }
}

/// Per-status totals shown on the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusCounts {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a ApplicationRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut counts, record| {
                counts.total += 1;
                match record.status {
                    ApplicationStatus::Pending => counts.pending += 1,
                    ApplicationStatus::Approved => counts.approved += 1,
                    ApplicationStatus::Rejected => counts.rejected += 1,
                }
                counts
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_id_parse_rejects_traversal_and_bad_shapes() {
        assert!(ApplicationId::parse("APP20261014093015A1B2C3").is_some());
        assert!(ApplicationId::parse("APP20261014093015a1b2c3").is_none());
        assert!(ApplicationId::parse("../../etc/passwd").is_none());
        assert!(ApplicationId::parse("APP2026101409301/A1B2C3").is_none());
        assert!(ApplicationId::parse("APP20261014093015A1B2C").is_none());
    }

    #[test]
    fn program_codes_round_trip_through_catalogue() {
        for program in Program::ALL {
            assert_eq!(Program::from_code(program.code()), Some(program));
        }
        assert_eq!(Program::from_code("astrology"), None);
        assert_eq!(Program::Business.title(), "Business Administration");
    }

    #[test]
    fn application_id_parse_refuses_multibyte_input() {
        assert!(ApplicationId::parse("APP1234567890123\u{e9}ABCDE").is_none());
        assert!(ApplicationId::parse("APP2026101409301\u{4e00}A1B2C").is_none());
    }
}
