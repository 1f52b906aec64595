use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{error, info, warn};

use crate::auth::AdminIdentity;

use super::documents::{DocumentError, DocumentStore};
use super::domain::{
    ApplicationId, ApplicationQuery, ApplicationRecord, ApplicationStatus, DocumentRole,
    NewApplication, ReviewDecision, ReviewOutcome, StatusCounts, StoredRef, SubmittedDocuments,
};
use super::identifier::{IdentifierGenerator, TimestampedIdentifiers};
use super::letter::{AdmissionLetter, LetterError, LetterRenderer};
use super::lifecycle::{transition, ReviewAction, TransitionError};
use super::repository::{ApplicationRepository, CommitGate, RepositoryError};
use super::validation::{validate_submission, ApplicationSubmission, ValidationErrors};

/// How many identifiers are tried before a submission fails as a transient conflict.
const IDENTIFIER_ATTEMPTS: usize = 2;

/// Service composing validation, identifier allocation, storage, and the review
/// lifecycle.
pub struct AdmissionService<R, D> {
    repository: Arc<R>,
    documents: Arc<D>,
    letters: Arc<dyn LetterRenderer>,
    identifiers: Arc<dyn IdentifierGenerator>,
}

impl<R, D> AdmissionService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(repository: Arc<R>, documents: Arc<D>, letters: Arc<dyn LetterRenderer>) -> Self {
        Self {
            repository,
            documents,
            letters,
            identifiers: Arc::new(TimestampedIdentifiers),
        }
    }

    pub fn with_identifiers(mut self, identifiers: Arc<dyn IdentifierGenerator>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Validate and persist a new application in the `Pending` state.
    ///
    /// Nothing is written unless validation passes; uploads are removed again if the
    /// record cannot be created.
    pub fn submit(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationRecord, AdmissionError> {
        self.submit_gated(submission, &CommitGate::default())
    }

    /// [`submit`](Self::submit) whose record write is refused once `gate` is abandoned.
    pub fn submit_gated(
        &self,
        submission: ApplicationSubmission,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, AdmissionError> {
        let validated = validate_submission(&submission).map_err(|errors| {
            info!(violations = errors.len(), "submission failed validation");
            AdmissionError::Validation(errors)
        })?;

        let submitted_at = now();
        let application_id = self.allocate_identifier(submitted_at)?;

        let degree_certificate = self.documents.save(
            &application_id,
            DocumentRole::DegreeCertificate,
            &validated.degree_certificate.bytes,
            &validated.degree_certificate.original_name,
        )?;
        let id_proof = match self.documents.save(
            &application_id,
            DocumentRole::IdProof,
            &validated.id_proof.bytes,
            &validated.id_proof.original_name,
        ) {
            Ok(reference) => reference,
            Err(err) => {
                self.discard(&[degree_certificate]);
                return Err(err.into());
            }
        };

        let application = NewApplication {
            application_id,
            applicant: validated.applicant,
            academic: validated.academic,
            documents: SubmittedDocuments {
                degree_certificate,
                id_proof,
            },
            submitted_at,
        };
        let uploads = [
            application.documents.degree_certificate.clone(),
            application.documents.id_proof.clone(),
        ];

        match self.repository.insert(application, gate) {
            Ok(record) => {
                info!(
                    application_id = %record.application_id,
                    program = record.academic.program.code(),
                    "application submitted"
                );
                Ok(record)
            }
            Err(err) => {
                self.discard(&uploads);
                Err(match err {
                    RepositoryError::Conflict => AdmissionError::IdentifierExhausted,
                    other => other.into(),
                })
            }
        }
    }

    fn allocate_identifier(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ApplicationId, AdmissionError> {
        for attempt in 1..=IDENTIFIER_ATTEMPTS {
            let candidate = self.identifiers.generate(now);
            if !self.repository.exists(&candidate)? {
                return Ok(candidate);
            }
            warn!(%candidate, attempt, "application id collision");
        }
        Err(AdmissionError::IdentifierExhausted)
    }

    /// Approve a pending application and attach its admission letter.
    ///
    /// The letter is rendered and stored before the decision is written; if any step
    /// fails the application stays `Pending` and a stored letter is removed.
    pub fn approve(
        &self,
        application_id: &ApplicationId,
        reviewer: &AdminIdentity,
    ) -> Result<ApplicationRecord, AdmissionError> {
        self.approve_gated(application_id, reviewer, &CommitGate::default())
    }

    pub fn approve_gated(
        &self,
        application_id: &ApplicationId,
        reviewer: &AdminIdentity,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, AdmissionError> {
        let record = self.get(application_id)?;
        transition(record.status, ReviewAction::Approve)?;

        let reviewed_at = now();
        let letter = AdmissionLetter::for_record(&record, reviewed_at.date_naive());
        let pdf = self.letters.render(&letter).map_err(|err| {
            error!(%application_id, error = %err, "admission letter generation failed");
            AdmissionError::GenerationFailed(err)
        })?;
        let letter_ref = self.documents.save(
            application_id,
            DocumentRole::AdmissionLetter,
            &pdf,
            "admission_letter.pdf",
        )?;

        let decision = ReviewDecision {
            application_id: application_id.clone(),
            outcome: ReviewOutcome::Approved {
                letter: letter_ref.clone(),
            },
            reviewer: reviewer.username().to_string(),
            reviewed_at,
        };
        match self.repository.record_decision(decision, gate) {
            Ok(updated) => {
                info!(%application_id, reviewer = reviewer.username(), "application approved");
                Ok(updated)
            }
            Err(err) => {
                self.discard(&[letter_ref]);
                Err(decision_error(application_id, ReviewAction::Approve, err))
            }
        }
    }

    pub fn reject(
        &self,
        application_id: &ApplicationId,
        reviewer: &AdminIdentity,
    ) -> Result<ApplicationRecord, AdmissionError> {
        self.reject_gated(application_id, reviewer, &CommitGate::default())
    }

    pub fn reject_gated(
        &self,
        application_id: &ApplicationId,
        reviewer: &AdminIdentity,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, AdmissionError> {
        let record = self.get(application_id)?;
        transition(record.status, ReviewAction::Reject)?;

        let decision = ReviewDecision {
            application_id: application_id.clone(),
            outcome: ReviewOutcome::Rejected,
            reviewer: reviewer.username().to_string(),
            reviewed_at: now(),
        };
        let updated = self
            .repository
            .record_decision(decision, gate)
            .map_err(|err| decision_error(application_id, ReviewAction::Reject, err))?;
        info!(%application_id, reviewer = reviewer.username(), "application rejected");
        Ok(updated)
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<ApplicationRecord, AdmissionError> {
        self.repository
            .fetch(application_id)?
            .ok_or_else(|| AdmissionError::NotFound(application_id.to_string()))
    }

    pub fn get_by_row_id(&self, row_id: i64) -> Result<ApplicationRecord, AdmissionError> {
        self.repository
            .fetch_by_row_id(row_id)?
            .ok_or_else(|| AdmissionError::NotFound(row_id.to_string()))
    }

    pub fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, AdmissionError> {
        Ok(self.repository.list(query)?)
    }

    /// Every application newest first, plus per-status totals.
    pub fn dashboard(&self) -> Result<(StatusCounts, Vec<ApplicationRecord>), AdmissionError> {
        let records = self.repository.list(&ApplicationQuery::default())?;
        Ok((StatusCounts::tally(&records), records))
    }

    /// The stored admission letter; only approved applications have one.
    pub fn admission_letter(
        &self,
        application_id: &ApplicationId,
    ) -> Result<(ApplicationRecord, Vec<u8>), AdmissionError> {
        let record = self.get(application_id)?;
        if record.status != ApplicationStatus::Approved {
            return Err(AdmissionError::LetterUnavailable {
                status: record.status,
            });
        }
        let bytes = self.read_document(&record, DocumentRole::AdmissionLetter)?;
        Ok((record, bytes))
    }

    /// A stored file of the application, resolved only through the record's references.
    pub fn document(
        &self,
        application_id: &ApplicationId,
        role: DocumentRole,
    ) -> Result<(StoredRef, Vec<u8>), AdmissionError> {
        let record = self.get(application_id)?;
        let bytes = self.read_document(&record, role)?;
        let reference = record
            .document(role)
            .cloned()
            .ok_or_else(|| AdmissionError::NotFound(role.label().to_string()))?;
        Ok((reference, bytes))
    }

    fn read_document(
        &self,
        record: &ApplicationRecord,
        role: DocumentRole,
    ) -> Result<Vec<u8>, AdmissionError> {
        let not_found =
            || AdmissionError::NotFound(format!("{} {}", record.application_id, role.label()));
        let reference = record.document(role).ok_or_else(not_found)?;
        match self.documents.retrieve(reference) {
            Ok(bytes) => Ok(bytes),
            Err(DocumentError::NotFound) => Err(not_found()),
            Err(err) => Err(err.into()),
        }
    }

    fn discard(&self, references: &[StoredRef]) {
        for reference in references {
            if let Err(err) = self.documents.remove(reference) {
                warn!(
                    reference = reference.as_str(),
                    error = %err,
                    "failed to remove orphaned document"
                );
            }
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn decision_error(
    application_id: &ApplicationId,
    action: ReviewAction,
    err: RepositoryError,
) -> AdmissionError {
    match err {
        RepositoryError::NotFound => AdmissionError::NotFound(application_id.to_string()),
        RepositoryError::InvalidTransition { current } => {
            AdmissionError::InvalidTransition(TransitionError { current, action })
        }
        other => other.into(),
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("application {0} not found")]
    NotFound(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("admission letter is not available while the application is {status}")]
    LetterUnavailable { status: ApplicationStatus },
    #[error(transparent)]
    GenerationFailed(#[from] LetterError),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("could not allocate a unique application id, please retry")]
    IdentifierExhausted,
}

impl AdmissionError {
    /// Stable machine-readable code for API clients.
    pub const fn code(&self) -> &'static str {
        match self {
            AdmissionError::Validation(_) => "validation_error",
            AdmissionError::NotFound(_) => "not_found",
            AdmissionError::InvalidTransition(_) => "invalid_transition",
            AdmissionError::LetterUnavailable { .. } => "letter_unavailable",
            AdmissionError::GenerationFailed(_) => "generation_failed",
            AdmissionError::StorageUnavailable(_) => "storage_unavailable",
            AdmissionError::IdentifierExhausted => "identifier_conflict",
        }
    }
}

impl From<RepositoryError> for AdmissionError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound("record".to_string()),
            RepositoryError::Conflict => Self::IdentifierExhausted,
            // Decisions go through `decision_error`, which knows the attempted action.
            RepositoryError::InvalidTransition { current } => {
                Self::StorageUnavailable(format!("unexpected write conflict on a {current} record"))
            }
            RepositoryError::Abandoned => {
                Self::StorageUnavailable("storage operation timed out".to_string())
            }
            RepositoryError::Unavailable(detail) => Self::StorageUnavailable(detail),
        }
    }
}

impl From<DocumentError> for AdmissionError {
    fn from(value: DocumentError) -> Self {
        match value {
            DocumentError::NotFound => Self::NotFound("document".to_string()),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}
