//! Student admission intake, administrative review, and admission letters.
//!
//! Applicants submit a validated form with two supporting documents and receive an
//! application id. Administrators move each application from `pending` to exactly one
//! terminal decision; approval attaches a generated PDF letter the applicant can download.

pub mod documents;
pub mod domain;
pub mod identifier;
pub mod letter;
pub mod lifecycle;
mod pages;
pub mod repository;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod validation;

#[cfg(test)]
mod tests;

pub use documents::{DocumentError, DocumentStore, FsDocumentStore};
pub use domain::{
    AcademicDetails, ApplicantDetails, ApplicationId, ApplicationQuery, ApplicationRecord,
    ApplicationStatus, DocumentRole, NewApplication, Program, ReviewDecision, ReviewOutcome,
    StatusCounts, StoredRef, SubmissionOrder, SubmittedDocuments,
};
pub use identifier::{IdentifierGenerator, TimestampedIdentifiers};
pub use letter::{AdmissionLetter, LetterError, LetterRenderer, PdfLetterRenderer};
pub use lifecycle::{transition, ReviewAction, TransitionError};
pub use repository::{ApplicationRepository, CommitGate, RepositoryError};
pub use router::{admission_router, AdmissionContext, SESSION_COOKIE};
pub use service::{AdmissionError, AdmissionService};
pub use sqlite::SqliteApplicationRepository;
pub use validation::{
    validate_submission, ApplicationForm, ApplicationSubmission, FieldError, UploadedDocument,
    ValidationErrors, MAX_DOCUMENT_BYTES,
};
