use admission_desk::auth::AdminDirectory;
use admission_desk::config::{AppConfig, AppEnvironment};
use admission_desk::error::AppError;
use admission_desk::workflows::admission::{
    AdmissionContext, AdmissionService, FsDocumentStore, PdfLetterRenderer,
    SqliteApplicationRepository,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type DiskContext = AdmissionContext<SqliteApplicationRepository, FsDocumentStore>;

pub(crate) fn open_repository(config: &AppConfig) -> Result<SqliteApplicationRepository, AppError> {
    Ok(SqliteApplicationRepository::open(
        &config.storage.database_path,
        config.storage.operation_timeout,
    )?)
}

/// Open the configured stores and wire the admission handlers' shared context.
pub(crate) fn build_context(config: &AppConfig) -> Result<DiskContext, AppError> {
    let repository = Arc::new(open_repository(config)?);
    let documents = Arc::new(FsDocumentStore::new(&config.storage.upload_dir)?);
    let letters = Arc::new(PdfLetterRenderer::new(
        config.letters.institution_name.clone(),
    ));

    Ok(AdmissionContext {
        service: Arc::new(AdmissionService::new(repository, documents, letters)),
        admins: Arc::new(AdminDirectory::from_config(&config.admin)),
        session_ttl: config.admin.session_ttl,
        secure_cookies: config.environment == AppEnvironment::Production,
        operation_timeout: config.storage.operation_timeout,
    })
}
