use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Form, Multipart, Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;
use tracing::{error, info, warn};

use crate::auth::{self, AdminDirectory, AdminIdentity, AuthError};

use super::documents::DocumentStore;
use super::domain::{
    ApplicationId, ApplicationQuery, ApplicationRecord, ApplicationStatus, DocumentRole,
};
use super::pages;
use super::repository::{ApplicationRepository, CommitGate};
use super::service::{AdmissionError, AdmissionService};
use super::validation::{
    ApplicationForm, ApplicationSubmission, UploadedDocument, ValidationErrors, MAX_DOCUMENT_BYTES,
};

pub const SESSION_COOKIE: &str = "admission_session";

/// Response header carrying the id of a freshly submitted application.
pub const APPLICATION_ID_HEADER: HeaderName = HeaderName::from_static("x-application-id");

/// Room for two maximum-size uploads plus the text fields, so oversize files reach
/// validation instead of failing the whole request.
const REQUEST_BODY_LIMIT: usize = 2 * MAX_DOCUMENT_BYTES + 4 * 1024 * 1024;

/// Everything the admission handlers share.
pub struct AdmissionContext<R, D> {
    pub service: Arc<AdmissionService<R, D>>,
    pub admins: Arc<AdminDirectory>,
    /// Admin sessions expire after this long without a request.
    pub session_ttl: Duration,
    /// Mark the session cookie `Secure`; off only for plain-http development.
    pub secure_cookies: bool,
    /// Bound applied to each blocking service call.
    pub operation_timeout: Duration,
}

impl<R, D> Clone for AdmissionContext<R, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            admins: Arc::clone(&self.admins),
            session_ttl: self.session_ttl,
            secure_cookies: self.secure_cookies,
            operation_timeout: self.operation_timeout,
        }
    }
}

/// Public intake, applicant status, admin review, and the JSON read API.
pub fn admission_router<R, D>(context: AdmissionContext<R, D>) -> Router
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let sessions =
        auth::session_layer(SESSION_COOKIE, context.session_ttl, context.secure_cookies);
    Router::new()
        .route("/", get(landing_handler))
        .route(
            "/apply",
            get(apply_form_handler).post(submit_handler::<R, D>),
        )
        .route("/status/:application_id", get(status_handler::<R, D>))
        .route("/download/:application_id", get(download_handler::<R, D>))
        .route(
            "/admin/login",
            get(login_form_handler).post(login_handler::<R, D>),
        )
        .route("/admin/logout", post(logout_handler))
        .route("/admin/dashboard", get(dashboard_handler::<R, D>))
        .route(
            "/admin/application/:application_id",
            get(admin_detail_handler::<R, D>),
        )
        .route(
            "/admin/application/:application_id/documents/:role",
            get(admin_document_handler::<R, D>),
        )
        .route(
            "/admin/approve/:application_id",
            post(approve_handler::<R, D>),
        )
        .route("/admin/reject/:application_id", post(reject_handler::<R, D>))
        .route("/api/applications", get(api_list_handler::<R, D>))
        .route("/api/applications/:id", get(api_detail_handler::<R, D>))
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT))
        .layer(sessions)
        .with_state(context)
}

/// Run a service call off the async runtime, bounded by the operation timeout.
///
/// At the deadline the job's [`CommitGate`] is abandoned, so a timed-out write never
/// commits afterwards. A job that already began committing is awaited instead and its
/// own outcome returned.
async fn run_blocking<R, D, T, F>(
    context: &AdmissionContext<R, D>,
    job: F,
) -> Result<T, AdmissionError>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
    T: Send + 'static,
    F: FnOnce(&AdmissionService<R, D>, &CommitGate) -> Result<T, AdmissionError>
        + Send
        + 'static,
{
    let service = Arc::clone(&context.service);
    let gate = CommitGate::default();
    let job_gate = gate.clone();
    let mut task = tokio::task::spawn_blocking(move || job(&service, &job_gate));

    let joined = match tokio::time::timeout(context.operation_timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) if gate.abandon() => {
            warn!(
                timeout_ms = context.operation_timeout.as_millis() as u64,
                "storage operation abandoned at its deadline"
            );
            return Err(AdmissionError::StorageUnavailable(
                "storage operation timed out".to_string(),
            ));
        }
        Err(_) => task.await,
    };
    joined.unwrap_or_else(|join_error| {
        Err(AdmissionError::StorageUnavailable(format!(
            "storage task failed: {join_error}"
        )))
    })
}

fn status_for(err: &AdmissionError) -> StatusCode {
    match err {
        AdmissionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdmissionError::NotFound(_) => StatusCode::NOT_FOUND,
        AdmissionError::InvalidTransition(_) | AdmissionError::IdentifierExhausted => {
            StatusCode::CONFLICT
        }
        AdmissionError::LetterUnavailable { .. } => StatusCode::FORBIDDEN,
        AdmissionError::GenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AdmissionError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(err: AdmissionError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(code = err.code(), error = %err, "admission request failed");
    }
    let mut payload = json!({
        "error": err.code(),
        "message": err.to_string(),
    });
    if let AdmissionError::Validation(errors) = &err {
        payload["fields"] = json!(errors);
    }
    (status, Json(payload)).into_response()
}

fn auth_failure(err: AuthError) -> Response {
    if let AuthError::SessionStore(detail) = err {
        return error_response(AdmissionError::StorageUnavailable(detail));
    }
    let payload = json!({
        "error": "unauthorized",
        "message": err.to_string(),
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn not_found(what: &str) -> Response {
    error_response(AdmissionError::NotFound(what.to_string()))
}

fn parse_application_id(raw: &str) -> Result<ApplicationId, Response> {
    ApplicationId::parse(raw).ok_or_else(|| not_found(raw))
}

async fn require_admin(session: &Session) -> Result<AdminIdentity, Response> {
    auth::current_admin(session).await.map_err(auth_failure)
}

fn summary_view(record: &ApplicationRecord) -> Value {
    json!({
        "id": record.id,
        "application_id": record.application_id,
        "first_name": record.applicant.first_name,
        "last_name": record.applicant.last_name,
        "email": record.applicant.email,
        "status": record.status,
        "submitted_at": record.submitted_at,
    })
}

fn detail_view(record: &ApplicationRecord) -> Value {
    let documents_base = format!("/admin/application/{}/documents", record.application_id);
    let letter_url = record
        .admission_letter
        .as_ref()
        .map(|_| format!("/download/{}", record.application_id));
    json!({
        "id": record.id,
        "application_id": record.application_id,
        "first_name": record.applicant.first_name,
        "last_name": record.applicant.last_name,
        "email": record.applicant.email,
        "phone": record.applicant.phone,
        "date_of_birth": record.applicant.date_of_birth,
        "address": record.applicant.address,
        "program": record.academic.program,
        "program_title": record.academic.program.title(),
        "previous_education": record.academic.previous_education,
        "gpa": record.academic.gpa,
        "status": record.status,
        "submitted_at": record.submitted_at,
        "reviewed_at": record.reviewed_at,
        "reviewed_by": record.reviewed_by,
        "documents": {
            "degree_certificate": format!(
                "{documents_base}/{}",
                DocumentRole::DegreeCertificate.label()
            ),
            "id_proof": format!("{documents_base}/{}", DocumentRole::IdProof.label()),
        },
        "admission_letter": letter_url,
    })
}

fn attachment(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{file_name}\"");
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub(crate) async fn landing_handler() -> Html<String> {
    Html(pages::landing())
}

pub(crate) async fn apply_form_handler() -> Html<String> {
    Html(pages::apply_form(
        &ApplicationForm::default(),
        &ValidationErrors::default(),
    ))
}

/// Collect text fields and both uploads from a multipart form.
async fn read_submission(mut multipart: Multipart) -> Result<ApplicationSubmission, Response> {
    let malformed = |err: axum::extract::multipart::MultipartError| {
        let status = err.status();
        let payload = json!({ "error": "malformed_request", "message": err.body_text() });
        (status, Json(payload)).into_response()
    };

    let mut submission = ApplicationSubmission::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "degree_certificate" | "id_proof" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                // Browsers send an empty part when no file was chosen.
                let upload = if file_name.is_empty() && bytes.is_empty() {
                    None
                } else {
                    Some(UploadedDocument::new(file_name, bytes.to_vec()))
                };
                if name == "degree_certificate" {
                    submission.degree_certificate = upload;
                } else {
                    submission.id_proof = upload;
                }
            }
            _ => {
                let value = field.text().await.map_err(malformed)?;
                submission.form.set_field(&name, value);
            }
        }
    }
    Ok(submission)
}

pub(crate) async fn submit_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    multipart: Multipart,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(response) => return response,
    };
    let form = submission.form.clone();

    let submitted = run_blocking(&context, move |service, gate| {
        service.submit_gated(submission, gate)
    })
    .await;
    match submitted {
        Ok(record) => {
            let location = format!("/status/{}", record.application_id);
            let mut response = Redirect::to(&location).into_response();
            if let Ok(value) = HeaderValue::from_str(record.application_id.as_str()) {
                response.headers_mut().insert(APPLICATION_ID_HEADER, value);
            }
            response
        }
        Err(AdmissionError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(pages::apply_form(&form, &errors)),
        )
            .into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn status_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = match parse_application_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match run_blocking(&context, move |service, _| service.get(&id)).await {
        Ok(record) => {
            let download_url = (record.status == ApplicationStatus::Approved)
                .then(|| format!("/download/{}", record.application_id));
            let payload = json!({
                "application_id": record.application_id,
                "first_name": record.applicant.first_name,
                "last_name": record.applicant.last_name,
                "program": record.academic.program.title(),
                "status": record.status,
                "submitted_at": record.submitted_at,
                "reviewed_at": record.reviewed_at,
                "download_url": download_url,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn download_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = match parse_application_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match run_blocking(&context, move |service, _| service.admission_letter(&id)).await {
        Ok((record, bytes)) => attachment(
            mime::APPLICATION_PDF.as_ref(),
            &format!("admission_letter_{}.pdf", record.application_id),
            bytes,
        ),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn login_form_handler() -> Html<String> {
    Html(pages::login_form(None))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub(crate) async fn login_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    session: Session,
    Form(credentials): Form<LoginForm>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let username = credentials.username.trim();
    match context.admins.verify(username, &credentials.password) {
        Ok(identity) => {
            if let Err(err) = auth::sign_in(&session, &identity).await {
                return auth_failure(err);
            }
            info!(username, "admin login");
            Redirect::to("/admin/dashboard").into_response()
        }
        Err(err) => {
            warn!(username, "admin login failed");
            (
                StatusCode::UNAUTHORIZED,
                Html(pages::login_form(Some(&err.to_string()))),
            )
                .into_response()
        }
    }
}

pub(crate) async fn logout_handler(session: Session) -> Response {
    match auth::sign_out(&session).await {
        Ok(()) => Redirect::to("/admin/login").into_response(),
        Err(err) => auth_failure(err),
    }
}

pub(crate) async fn dashboard_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    session: Session,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    if let Err(response) = require_admin(&session).await {
        return response;
    }
    match run_blocking(&context, |service, _| service.dashboard()).await {
        Ok((counts, records)) => {
            let applications: Vec<Value> = records.iter().map(summary_view).collect();
            let payload = json!({
                "counts": counts,
                "applications": applications,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn admin_detail_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path(application_id): Path<String>,
    session: Session,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    if let Err(response) = require_admin(&session).await {
        return response;
    }
    let id = match parse_application_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match run_blocking(&context, move |service, _| service.get(&id)).await {
        Ok(record) => (StatusCode::OK, Json(detail_view(&record))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn admin_document_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path((application_id, role)): Path<(String, String)>,
    session: Session,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    if let Err(response) = require_admin(&session).await {
        return response;
    }
    let id = match parse_application_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(role) = DocumentRole::from_label(&role) else {
        return not_found(&role);
    };
    match run_blocking(&context, move |service, _| service.document(&id, role)).await {
        Ok((reference, bytes)) => {
            let file_name = reference
                .as_str()
                .rsplit('/')
                .next()
                .unwrap_or(role.label())
                .to_string();
            let content_type = mime_guess::from_path(&file_name).first_or_octet_stream();
            attachment(content_type.as_ref(), &file_name, bytes)
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path(application_id): Path<String>,
    session: Session,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let reviewer = match require_admin(&session).await {
        Ok(reviewer) => reviewer,
        Err(response) => return response,
    };
    let id = match parse_application_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let decided = run_blocking(&context, move |service, gate| {
        service.approve_gated(&id, &reviewer, gate)
    })
    .await;
    match decided {
        Ok(record) => (StatusCode::OK, Json(detail_view(&record))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path(application_id): Path<String>,
    session: Session,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let reviewer = match require_admin(&session).await {
        Ok(reviewer) => reviewer,
        Err(response) => return response,
    };
    let id = match parse_application_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let decided = run_blocking(&context, move |service, gate| {
        service.reject_gated(&id, &reviewer, gate)
    })
    .await;
    match decided {
        Ok(record) => (StatusCode::OK, Json(detail_view(&record))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn api_list_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    query: Result<Query<ApplicationQuery>, QueryRejection>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            let payload = json!({ "error": "invalid_query", "message": rejection.body_text() });
            return (rejection.status(), Json(payload)).into_response();
        }
    };
    match run_blocking(&context, move |service, _| service.list(&query)).await {
        Ok(records) => {
            let payload: Vec<Value> = records.iter().map(summary_view).collect();
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn api_detail_handler<R, D>(
    State(context): State<AdmissionContext<R, D>>,
    Path(raw_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let Ok(id) = raw_id.parse::<i64>() else {
        return not_found(&raw_id);
    };
    match run_blocking(&context, move |service, _| service.get_by_row_id(id)).await {
        Ok(record) => (StatusCode::OK, Json(detail_view(&record))).into_response(),
        Err(err) => error_response(err),
    }
}
