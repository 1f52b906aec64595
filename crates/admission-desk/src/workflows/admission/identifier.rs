use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::ApplicationId;

/// Source of candidate application identifiers. Uniqueness against the store is
/// checked by the caller.
pub trait IdentifierGenerator: Send + Sync {
    fn generate(&self, now: DateTime<Utc>) -> ApplicationId;
}

/// `APP` + UTC `YYYYMMDDHHMMSS` + six upper-case hex characters from a v4 uuid.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampedIdentifiers;

impl IdentifierGenerator for TimestampedIdentifiers {
    fn generate(&self, now: DateTime<Utc>) -> ApplicationId {
        let random = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        let suffix = &random[..ApplicationId::SUFFIX_LEN];
        ApplicationId(format!(
            "{}{}{}",
            ApplicationId::PREFIX,
            now.format("%Y%m%d%H%M%S"),
            suffix
        ))
    }
}
