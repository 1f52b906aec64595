use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::domain::{
    ApplicationId, ApplicationQuery, ApplicationRecord, ApplicationStatus, NewApplication,
    ReviewDecision,
};

/// Storage abstraction so the service can run against SQLite or a test double.
///
/// Implementations must make every successful `insert` and `record_decision` durable
/// before returning, and `record_decision` must check `status == Pending` and write the
/// decision as one atomic step. Both writes call [`CommitGate::begin_commit`] right before
/// they commit and leave nothing behind when it refuses.
pub trait ApplicationRepository: Send + Sync {
    fn insert(
        &self,
        application: NewApplication,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn fetch_by_row_id(&self, row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn exists(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        Ok(self.fetch(id)?.is_some())
    }
    fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn record_decision(
        &self,
        decision: ReviewDecision,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError>;
}

const OPEN: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Settles, once, whether a write may still commit or its caller has stopped waiting.
///
/// The store calls [`begin_commit`](Self::begin_commit) immediately before committing and
/// the caller calls [`abandon`](Self::abandon) when its deadline passes. Whichever comes
/// first wins, so a caller that reports a timeout knows nothing was committed.
#[derive(Debug, Clone, Default)]
pub struct CommitGate(Arc<AtomicU8>);

impl CommitGate {
    pub fn begin_commit(&self) -> Result<(), RepositoryError> {
        match self
            .0
            .compare_exchange(OPEN, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(COMMITTING) => Ok(()),
            Err(_) => Err(RepositoryError::Abandoned),
        }
    }

    /// `false` when a commit is already under way; the caller must then await its outcome.
    pub fn abandon(&self) -> bool {
        match self
            .0
            .compare_exchange(OPEN, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(ABANDONED) => true,
            Err(_) => false,
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("application id already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("application is already {current}")]
    InvalidTransition { current: ApplicationStatus },
    #[error("write abandoned after the caller's deadline")]
    Abandoned,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
