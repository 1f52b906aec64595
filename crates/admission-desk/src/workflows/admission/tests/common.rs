use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::{AdminDirectory, AdminIdentity};
use crate::workflows::admission::documents::{DocumentError, DocumentStore};
use crate::workflows::admission::domain::{
    ApplicationId, ApplicationQuery, ApplicationRecord, ApplicationStatus, DocumentRole,
    NewApplication, ReviewDecision, StoredRef,
};
use crate::workflows::admission::identifier::IdentifierGenerator;
use crate::workflows::admission::letter::{
    AdmissionLetter, LetterError, LetterRenderer, PdfLetterRenderer,
};
use crate::workflows::admission::repository::{ApplicationRepository, CommitGate, RepositoryError};
use crate::workflows::admission::router::{admission_router, AdmissionContext};
use crate::workflows::admission::service::AdmissionService;
use crate::workflows::admission::validation::{
    ApplicationForm, ApplicationSubmission, UploadedDocument,
};

pub(super) const ADMIN_USERNAME: &str = "testadmin";
pub(super) const ADMIN_PASSWORD: &str = "testpass";

pub(super) fn ada_form() -> ApplicationForm {
    ApplicationForm {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@x.org".to_string(),
        phone: "1234567890".to_string(),
        date_of_birth: "1990-01-01".to_string(),
        address: "10 Analytical Engine Way".to_string(),
        program: "computer_science".to_string(),
        previous_education: "Private tutoring in mathematics".to_string(),
        gpa: "3.9".to_string(),
    }
}

pub(super) fn ada_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        form: ada_form(),
        degree_certificate: Some(UploadedDocument::new(
            "degree.pdf",
            b"%PDF-1.4 degree".to_vec(),
        )),
        id_proof: Some(UploadedDocument::new("passport.png", b"\x89PNG id".to_vec())),
    }
}

pub(super) fn reviewer() -> AdminIdentity {
    admins()
        .verify(ADMIN_USERNAME, ADMIN_PASSWORD)
        .expect("test admin verifies")
}

pub(super) fn admins() -> AdminDirectory {
    let mut directory = AdminDirectory::default();
    directory.add_account(ADMIN_USERNAME, ADMIN_PASSWORD);
    directory
}

pub(super) type MemoryService = AdmissionService<MemoryRepository, MemoryDocuments>;

pub(super) fn build_service() -> (MemoryService, Arc<MemoryRepository>, Arc<MemoryDocuments>) {
    let repository = Arc::new(MemoryRepository::default());
    let documents = Arc::new(MemoryDocuments::default());
    let service = AdmissionService::new(
        repository.clone(),
        documents.clone(),
        Arc::new(PdfLetterRenderer::new("Analytical University")),
    );
    (service, repository, documents)
}

pub(super) fn context<R, D>(service: AdmissionService<R, D>) -> AdmissionContext<R, D> {
    AdmissionContext {
        service: Arc::new(service),
        admins: Arc::new(admins()),
        session_ttl: Duration::from_secs(600),
        secure_cookies: false,
        operation_timeout: Duration::from_secs(5),
    }
}

pub(super) fn router_with<R, D>(context: AdmissionContext<R, D>) -> axum::Router
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    admission_router(context)
}

pub(super) fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::post("/admin/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={username}&password={password}")))
        .expect("request builds")
}

/// The `name=value` pair of a response's `Set-Cookie` header.
pub(super) fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .expect("session cookie")
        .to_string()
}

/// Log the test admin in through the router and return the `Cookie` header value.
pub(super) async fn admin_cookie(router: &axum::Router) -> String {
    let response = router
        .clone()
        .oneshot(login_request(ADMIN_USERNAME, ADMIN_PASSWORD))
        .await
        .expect("login executes");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie(&response)
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .expect("read body")
        .to_vec()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = read_body(response).await;
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

pub(super) fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_bytes())
}

pub(super) const BOUNDARY: &str = "admission-test-boundary";

/// Encode a multipart body with text fields followed by file parts.
pub(super) fn multipart_body(form: &ApplicationForm, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let fields = [
        ("first_name", &form.first_name),
        ("last_name", &form.last_name),
        ("email", &form.email),
        ("phone", &form.phone),
        ("date_of_birth", &form.date_of_birth),
        ("address", &form.address),
        ("program", &form.program),
        ("previous_education", &form.previous_education),
        ("gpa", &form.gpa),
    ];
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<Vec<ApplicationRecord>>,
}

impl MemoryRepository {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(
        &self,
        application: NewApplication,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard
            .iter()
            .any(|record| record.application_id == application.application_id)
        {
            return Err(RepositoryError::Conflict);
        }
        gate.begin_commit()?;
        let id = i64::try_from(guard.len()).expect("row count fits") + 1;
        let record = ApplicationRecord::from_new(id, application);
        guard.push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .find(|record| &record.application_id == id)
            .cloned())
    }

    fn fetch_by_row_id(&self, row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.iter().find(|record| record.id == row_id).cloned())
    }

    fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<_> = guard
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        query.sort(&mut records);
        Ok(records)
    }

    fn record_decision(
        &self,
        decision: ReviewDecision,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard
            .iter_mut()
            .find(|record| record.application_id == decision.application_id)
            .ok_or(RepositoryError::NotFound)?;
        if record.status != ApplicationStatus::Pending {
            return Err(RepositoryError::InvalidTransition {
                current: record.status,
            });
        }
        gate.begin_commit()?;
        record.status = decision.outcome.status();
        record.admission_letter = decision.outcome.letter().cloned();
        record.reviewed_at = Some(decision.reviewed_at);
        record.reviewed_by = Some(decision.reviewer);
        Ok(record.clone())
    }
}

/// Serves stale pending snapshots on reads, as a reviewer who loaded the record just
/// before another reviewer decided it would see.
pub(super) struct StaleReadRepository {
    pub(super) inner: MemoryRepository,
    snapshot: Mutex<Option<ApplicationRecord>>,
}

impl StaleReadRepository {
    pub(super) fn new(inner: MemoryRepository, snapshot: ApplicationRecord) -> Self {
        Self {
            inner,
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl ApplicationRepository for StaleReadRepository {
    fn insert(
        &self,
        application: NewApplication,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert(application, gate)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let snapshot = self.snapshot.lock().expect("snapshot mutex poisoned").clone();
        match snapshot {
            Some(record) if &record.application_id == id => Ok(Some(record)),
            _ => self.inner.fetch(id),
        }
    }

    fn fetch_by_row_id(&self, row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch_by_row_id(row_id)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.list(query)
    }

    fn record_decision(
        &self,
        decision: ReviewDecision,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.record_decision(decision, gate)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(
        &self,
        _application: NewApplication,
        _gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_by_row_id(&self, _row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn record_decision(
        &self,
        _decision: ReviewDecision,
        _gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Reads succeed but every write fails, like a store that went read-only.
pub(super) struct ReadOnlyRepository(pub(super) MemoryRepository);

impl ApplicationRepository for ReadOnlyRepository {
    fn insert(
        &self,
        _application: NewApplication,
        _gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.0.fetch(id)
    }

    fn fetch_by_row_id(&self, row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.0.fetch_by_row_id(row_id)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.0.list(query)
    }

    fn record_decision(
        &self,
        _decision: ReviewDecision,
        _gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }
}

/// Stalls every write for `delay` before handing it to the inner store, like a disk
/// that stops responding under load.
pub(super) struct SlowRepository {
    pub(super) inner: MemoryRepository,
    delay: Duration,
}

impl SlowRepository {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryRepository::default(),
            delay,
        }
    }
}

impl ApplicationRepository for SlowRepository {
    fn insert(
        &self,
        application: NewApplication,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        std::thread::sleep(self.delay);
        self.inner.insert(application, gate)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn fetch_by_row_id(&self, row_id: i64) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch_by_row_id(row_id)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.list(query)
    }

    fn record_decision(
        &self,
        decision: ReviewDecision,
        gate: &CommitGate,
    ) -> Result<ApplicationRecord, RepositoryError> {
        std::thread::sleep(self.delay);
        self.inner.record_decision(decision, gate)
    }
}

/// In-memory document store; `fail_role` makes saves for one role fail.
#[derive(Default)]
pub(super) struct MemoryDocuments {
    files: Mutex<HashMap<StoredRef, Vec<u8>>>,
    fail_role: Option<DocumentRole>,
}

impl MemoryDocuments {
    pub(super) fn failing_on(role: DocumentRole) -> Self {
        Self {
            fail_role: Some(role),
            ..Self::default()
        }
    }

    pub(super) fn len(&self) -> usize {
        self.files.lock().expect("documents mutex poisoned").len()
    }

    pub(super) fn contains(&self, reference: &StoredRef) -> bool {
        self.files
            .lock()
            .expect("documents mutex poisoned")
            .contains_key(reference)
    }
}

impl DocumentStore for MemoryDocuments {
    fn save(
        &self,
        application_id: &ApplicationId,
        role: DocumentRole,
        bytes: &[u8],
        _original_name: &str,
    ) -> Result<StoredRef, DocumentError> {
        if self.fail_role == Some(role) {
            return Err(DocumentError::Unavailable(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        let reference = StoredRef(format!(
            "{application_id}/{}-{}",
            role.label(),
            Uuid::new_v4().simple()
        ));
        self.files
            .lock()
            .expect("documents mutex poisoned")
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }

    fn retrieve(&self, reference: &StoredRef) -> Result<Vec<u8>, DocumentError> {
        self.files
            .lock()
            .expect("documents mutex poisoned")
            .get(reference)
            .cloned()
            .ok_or(DocumentError::NotFound)
    }

    fn remove(&self, reference: &StoredRef) -> Result<(), DocumentError> {
        self.files
            .lock()
            .expect("documents mutex poisoned")
            .remove(reference)
            .map(|_| ())
            .ok_or(DocumentError::NotFound)
    }
}

pub(super) struct FailingRenderer;

impl LetterRenderer for FailingRenderer {
    fn render(&self, _letter: &AdmissionLetter) -> Result<Vec<u8>, LetterError> {
        Err(LetterError::Render("font table missing".to_string()))
    }
}

/// Hands out the same identifier every time and counts the calls.
pub(super) struct FixedIdentifiers {
    pub(super) id: ApplicationId,
    pub(super) calls: AtomicUsize,
}

impl FixedIdentifiers {
    pub(super) fn new(raw: &str) -> Self {
        Self {
            id: ApplicationId(raw.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentifierGenerator for FixedIdentifiers {
    fn generate(&self, _now: DateTime<Utc>) -> ApplicationId {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.id.clone()
    }
}
