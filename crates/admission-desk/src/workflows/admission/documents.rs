use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::domain::{ApplicationId, DocumentRole, StoredRef};
use super::validation::allowed_extension;

/// File persistence for uploads and generated letters.
///
/// Storage names are generated from the application id and role; the uploaded file name
/// only contributes a whitelisted extension.
pub trait DocumentStore: Send + Sync {
    fn save(
        &self,
        application_id: &ApplicationId,
        role: DocumentRole,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<StoredRef, DocumentError>;
    fn retrieve(&self, reference: &StoredRef) -> Result<Vec<u8>, DocumentError>;
    fn remove(&self, reference: &StoredRef) -> Result<(), DocumentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document not found")]
    NotFound,
    #[error("document reference '{0}' is not a stored document")]
    InvalidReference(String),
    #[error("document storage unavailable: {0}")]
    Unavailable(#[from] io::Error),
}

/// Stores each file at `<root>/<application_id>/<role>-<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference to a path under the root, refusing anything that is not
    /// exactly `<application_id>/<file>`.
    fn resolve(&self, reference: &StoredRef) -> Result<PathBuf, DocumentError> {
        let invalid = || DocumentError::InvalidReference(reference.as_str().to_string());
        let relative = Path::new(reference.as_str());
        let components: Vec<_> = relative.components().collect();
        let [Component::Normal(directory), Component::Normal(file)] = components.as_slice() else {
            return Err(invalid());
        };
        let directory = directory.to_str().ok_or_else(invalid)?;
        ApplicationId::parse(directory).ok_or_else(invalid)?;
        if file.to_str().map_or(true, |name| name.ends_with(PARTIAL_SUFFIX)) {
            return Err(invalid());
        }
        Ok(self.root.join(relative))
    }
}

const PARTIAL_SUFFIX: &str = ".partial";

impl DocumentStore for FsDocumentStore {
    fn save(
        &self,
        application_id: &ApplicationId,
        role: DocumentRole,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<StoredRef, DocumentError> {
        let application_id = ApplicationId::parse(application_id.as_str())
            .ok_or_else(|| DocumentError::InvalidReference(application_id.0.clone()))?;
        let extension = match role {
            DocumentRole::AdmissionLetter => "pdf",
            _ => allowed_extension(original_name).unwrap_or("bin"),
        };
        let file_name = format!(
            "{}-{}.{extension}",
            role.label(),
            Uuid::new_v4().simple()
        );

        let directory = self.root.join(application_id.as_str());
        fs::create_dir_all(&directory)?;
        let target = directory.join(&file_name);
        let staging = directory.join(format!("{file_name}{PARTIAL_SUFFIX}"));

        let written = write_synced(&staging, bytes).and_then(|()| fs::rename(&staging, &target));
        if let Err(err) = written {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }

        Ok(StoredRef(format!("{application_id}/{file_name}")))
    }

    fn retrieve(&self, reference: &StoredRef) -> Result<Vec<u8>, DocumentError> {
        let path = self.resolve(reference)?;
        fs::read(path).map_err(not_found_or_unavailable)
    }

    fn remove(&self, reference: &StoredRef) -> Result<(), DocumentError> {
        let path = self.resolve(reference)?;
        fs::remove_file(path).map_err(not_found_or_unavailable)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn not_found_or_unavailable(err: io::Error) -> DocumentError {
    if err.kind() == io::ErrorKind::NotFound {
        DocumentError::NotFound
    } else {
        DocumentError::Unavailable(err)
    }
}
