//! SQLite-backed [`ApplicationRepository`].
//!
//! A single connection guarded by a mutex serves all requests. Decisions run inside an
//! immediate transaction whose `UPDATE` only matches pending rows, so two reviewers racing
//! on the same application cannot both win even across processes sharing the file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use super::domain::{
    AcademicDetails, ApplicantDetails, ApplicationId, ApplicationQuery, ApplicationRecord,
    ApplicationStatus, NewApplication, Program, ReviewDecision, StoredRef, SubmissionOrder,
    SubmittedDocuments,
};
use super::repository::{ApplicationRepository, CommitGate, RepositoryError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    address TEXT NOT NULL,
    program TEXT NOT NULL,
    previous_education TEXT NOT NULL,
    gpa REAL NOT NULL CHECK (gpa >= 0.0 AND gpa <= 4.0),
    degree_certificate TEXT NOT NULL,
    id_proof TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    submitted_at TEXT NOT NULL,
    reviewed_at TEXT,
    reviewed_by TEXT,
    admission_letter TEXT,
    CHECK (admission_letter IS NULL OR status = 'approved')
);
CREATE INDEX IF NOT EXISTS applications_submitted_at ON applications (submitted_at);
";

const COLUMNS: &str = "id, application_id, first_name, last_name, email, phone, date_of_birth, \
     address, program, previous_education, gpa, degree_certificate, id_proof, status, \
     submitted_at, reviewed_at, reviewed_by, admission_letter";

pub struct SqliteApplicationRepository {
    conn: Mutex<Connection>,
}

impl SqliteApplicationRepository {
    /// Open (or create) the database file. `busy_timeout` bounds how long a write waits
    /// for a competing writer before failing as unavailable.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(unavailable)?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(unavailable)?;
        Self::initialise(conn, busy_timeout)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::initialise(conn, Duration::from_secs(1))
    }

    fn initialise(conn: Connection, busy_timeout: Duration) -> Result<Self, RepositoryError> {
        conn.busy_timeout(busy_timeout).map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("connection mutex poisoned".to_string()))
    }
}

impl ApplicationRepository for SqliteApplicationRepository {
    fn insert(
        &self,
        application: NewApplication,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;
        let inserted = tx.execute(
            "INSERT INTO applications (application_id, first_name, last_name, email, phone, \
             date_of_birth, address, program, previous_education, gpa, degree_certificate, \
             id_proof, status, submitted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'pending', ?13)",
            params![
                application.application_id.as_str(),
                application.applicant.first_name,
                application.applicant.last_name,
                application.applicant.email,
                application.applicant.phone,
                application.applicant.date_of_birth.format("%Y-%m-%d").to_string(),
                application.applicant.address,
                application.academic.program.code(),
                application.academic.previous_education,
                application.academic.gpa,
                application.documents.degree_certificate.as_str(),
                application.documents.id_proof.as_str(),
                format_timestamp(application.submitted_at),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(RepositoryError::Conflict);
            }
            Err(err) => return Err(unavailable(err)),
        }

        let row_id = tx.last_insert_rowid();
        // Dropping the transaction rolls the row back.
        gate.begin_commit()?;
        tx.commit().map_err(unavailable)?;
        Ok(ApplicationRecord::from_new(row_id, application))
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let conn = self.lock()?;
        select_by_application_id(&conn, id)
    }

    fn fetch_by_row_id(&self, row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM applications WHERE id = ?1"),
                params![row_id],
                RawRow::from_row,
            )
            .optional()
            .map_err(unavailable)?;
        raw.map(RawRow::into_record).transpose()
    }

    fn exists(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT 1 FROM applications WHERE application_id = ?1",
            params![id.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(unavailable)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let conn = self.lock()?;
        let direction = match query.order {
            SubmissionOrder::Newest => "DESC",
            SubmissionOrder::Oldest => "ASC",
        };
        let filter = if query.status.is_some() {
            "WHERE status = ?1"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM applications {filter} \
             ORDER BY submitted_at {direction}, id {direction}"
        );

        let mut statement = conn.prepare(&sql).map_err(unavailable)?;
        let rows = match query.status {
            Some(status) => statement
                .query_map(params![status.label()], RawRow::from_row)
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>()),
            None => statement
                .query_map([], RawRow::from_row)
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>()),
        }
        .map_err(unavailable)?;

        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn record_decision(
        &self,
        decision: ReviewDecision,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;

        let changed = tx
            .execute(
                "UPDATE applications \
                 SET status = ?1, reviewed_at = ?2, reviewed_by = ?3, admission_letter = ?4 \
                 WHERE application_id = ?5 AND status = 'pending'",
                params![
                    decision.outcome.status().label(),
                    format_timestamp(decision.reviewed_at),
                    decision.reviewer,
                    decision.outcome.letter().map(StoredRef::as_str),
                    decision.application_id.as_str(),
                ],
            )
            .map_err(unavailable)?;

        if changed == 0 {
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM applications WHERE application_id = ?1",
                    params![decision.application_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(unavailable)?;
            return match current {
                None => Err(RepositoryError::NotFound),
                Some(label) => Err(RepositoryError::InvalidTransition {
                    current: parse_status(&label)?,
                }),
            };
        }

        let record = select_by_application_id(&tx, &decision.application_id)?
            .ok_or(RepositoryError::NotFound)?;
        gate.begin_commit()?;
        tx.commit().map_err(unavailable)?;
        Ok(record)
    }
}

fn select_by_application_id(
    conn: &Connection,
    id: &ApplicationId,
) -> Result<Option<ApplicationRecord>, RepositoryError> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM applications WHERE application_id = ?1"),
            params![id.as_str()],
            RawRow::from_row,
        )
        .optional()
        .map_err(unavailable)?;
    raw.map(RawRow::into_record).transpose()
}

/// Column values as stored, before domain parsing.
struct RawRow {
    id: i64,
    application_id: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    date_of_birth: String,
    address: String,
    program: String,
    previous_education: String,
    gpa: f64,
    degree_certificate: String,
    id_proof: String,
    status: String,
    submitted_at: String,
    reviewed_at: Option<String>,
    reviewed_by: Option<String>,
    admission_letter: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            application_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            email: row.get(4)?,
            phone: row.get(5)?,
            date_of_birth: row.get(6)?,
            address: row.get(7)?,
            program: row.get(8)?,
            previous_education: row.get(9)?,
            gpa: row.get(10)?,
            degree_certificate: row.get(11)?,
            id_proof: row.get(12)?,
            status: row.get(13)?,
            submitted_at: row.get(14)?,
            reviewed_at: row.get(15)?,
            reviewed_by: row.get(16)?,
            admission_letter: row.get(17)?,
        })
    }

    fn into_record(self) -> Result<ApplicationRecord, RepositoryError> {
        let corrupt = |column: &str| {
            RepositoryError::Unavailable(format!("row {} has an unreadable {column}", self.id))
        };

        let date_of_birth = NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d")
            .map_err(|_| corrupt("date_of_birth"))?;
        let program = Program::from_code(&self.program).ok_or_else(|| corrupt("program"))?;
        let status = parse_status(&self.status)?;
        let submitted_at =
            parse_timestamp(&self.submitted_at).ok_or_else(|| corrupt("submitted_at"))?;
        let reviewed_at = match self.reviewed_at.as_deref() {
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| corrupt("reviewed_at"))?),
            None => None,
        };

        Ok(ApplicationRecord {
            id: self.id,
            application_id: ApplicationId(self.application_id),
            applicant: ApplicantDetails {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                phone: self.phone,
                date_of_birth,
                address: self.address,
            },
            academic: AcademicDetails {
                program,
                previous_education: self.previous_education,
                gpa: self.gpa,
            },
            documents: SubmittedDocuments {
                degree_certificate: StoredRef(self.degree_certificate),
                id_proof: StoredRef(self.id_proof),
            },
            status,
            submitted_at,
            reviewed_at,
            reviewed_by: self.reviewed_by,
            admission_letter: self.admission_letter.map(StoredRef),
        })
    }
}

fn parse_status(label: &str) -> Result<ApplicationStatus, RepositoryError> {
    ApplicationStatus::from_label(label)
        .ok_or_else(|| RepositoryError::Unavailable(format!("unknown status '{label}'")))
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

fn unavailable(err: rusqlite::Error) -> RepositoryError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            RepositoryError::Unavailable("database busy".to_string())
        }
        _ => RepositoryError::Unavailable(err.to_string()),
    }
}
