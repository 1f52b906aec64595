//! Boundary validation turning raw form input into typed application data.
//!
//! Every rule runs on every submission so callers can render all violations at once.
//! Nothing here touches storage.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{AcademicDetails, ApplicantDetails, Program};

pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Raw, untrusted form fields exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub previous_education: String,
    #[serde(default)]
    pub gpa: String,
}

impl ApplicationForm {
    /// Assign a text field by its form name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            "date_of_birth" => &mut self.date_of_birth,
            "address" => &mut self.address,
            "program" => &mut self.program,
            "previous_education" => &mut self.previous_education,
            "gpa" => &mut self.gpa,
            _ => return,
        };
        *slot = value;
    }
}

/// An uploaded file before it is persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("original_name", &self.original_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadedDocument {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-case extension if it is on the allow list.
    pub fn allowed_extension(&self) -> Option<&'static str> {
        allowed_extension(&self.original_name)
    }
}

pub fn allowed_extension(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .into_iter()
        .find(|allowed| *allowed == extension)
}

/// A complete submission: the form plus both required uploads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationSubmission {
    pub form: ApplicationForm,
    pub degree_certificate: Option<UploadedDocument>,
    pub id_proof: Option<UploadedDocument>,
}

/// Submission data after every rule passed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub applicant: ApplicantDetails,
    pub academic: AcademicDetails,
    pub degree_certificate: UploadedDocument,
    pub id_proof: UploadedDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        write!(f, "invalid submission ({})", rendered.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn for_field(&self, field: &str) -> impl Iterator<Item = &FieldError> + '_ {
        let field = field.to_string();
        self.0.iter().filter(move |error| error.field == field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.for_field(field).next().is_some()
    }
}

pub fn validate_submission(
    submission: &ApplicationSubmission,
) -> Result<ValidatedSubmission, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let form = &submission.form;

    let first_name = check_name(&mut errors, "first_name", &form.first_name);
    let last_name = check_name(&mut errors, "last_name", &form.last_name);
    let email = check_email(&mut errors, &form.email);
    let phone = check_length(&mut errors, "phone", &form.phone, 10, Some(15));
    let date_of_birth = check_date(&mut errors, &form.date_of_birth);
    let address = check_length(&mut errors, "address", &form.address, 10, None);
    let program = check_program(&mut errors, &form.program);
    let previous_education =
        check_required(&mut errors, "previous_education", &form.previous_education);
    let gpa = check_gpa(&mut errors, &form.gpa);
    let degree_certificate = check_document(
        &mut errors,
        "degree_certificate",
        submission.degree_certificate.as_ref(),
    );
    let id_proof = check_document(&mut errors, "id_proof", submission.id_proof.as_ref());

    match (
        first_name,
        last_name,
        email,
        phone,
        date_of_birth,
        address,
        program,
        previous_education,
        gpa,
        degree_certificate,
        id_proof,
    ) {
        (
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(phone),
            Some(date_of_birth),
            Some(address),
            Some(program),
            Some(previous_education),
            Some(gpa),
            Some(degree_certificate),
            Some(id_proof),
        ) if errors.is_empty() => Ok(ValidatedSubmission {
            applicant: ApplicantDetails {
                first_name,
                last_name,
                email,
                phone,
                date_of_birth,
                address,
            },
            academic: AcademicDetails {
                program,
                previous_education,
                gpa,
            },
            degree_certificate,
            id_proof,
        }),
        _ => Err(errors),
    }
}

fn check_required(
    errors: &mut ValidationErrors,
    field: &'static str,
    raw: &str,
) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        errors.push(field, "This field is required.");
        return None;
    }
    Some(value.to_string())
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    raw: &str,
    min: usize,
    max: Option<usize>,
) -> Option<String> {
    let value = check_required(errors, field, raw)?;
    let len = value.chars().count();
    let too_long = max.is_some_and(|max| len > max);
    if len < min || too_long {
        let message = match max {
            Some(max) => format!("Field must be between {min} and {max} characters long."),
            None => format!("Field must be at least {min} characters long."),
        };
        errors.push(field, message);
        return None;
    }
    Some(value)
}

fn check_name(errors: &mut ValidationErrors, field: &'static str, raw: &str) -> Option<String> {
    check_length(errors, field, raw, 2, Some(50))
}

fn check_email(errors: &mut ValidationErrors, raw: &str) -> Option<String> {
    let value = check_required(errors, "email", raw)?;
    if is_valid_email(&value) {
        Some(value)
    } else {
        errors.push("email", "Invalid email address.");
        None
    }
}

/// `local@domain.tld` with no whitespace, a single `@`, and a dotted domain whose labels
/// are non-empty.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn check_date(errors: &mut ValidationErrors, raw: &str) -> Option<NaiveDate> {
    let value = check_required(errors, "date_of_birth", raw)?;
    match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push("date_of_birth", "Date must be in YYYY-MM-DD format");
            None
        }
    }
}

fn check_program(errors: &mut ValidationErrors, raw: &str) -> Option<Program> {
    let value = check_required(errors, "program", raw)?;
    match Program::from_code(&value) {
        Some(program) => Some(program),
        None => {
            errors.push("program", "Not a valid choice.");
            None
        }
    }
}

fn check_gpa(errors: &mut ValidationErrors, raw: &str) -> Option<f64> {
    let value = check_required(errors, "gpa", raw)?;
    match value.parse::<f64>() {
        Ok(gpa) if gpa.is_finite() && (0.0..=4.0).contains(&gpa) => Some(gpa),
        _ => {
            errors.push("gpa", "GPA must be a number between 0.0 and 4.0");
            None
        }
    }
}

fn check_document(
    errors: &mut ValidationErrors,
    field: &'static str,
    document: Option<&UploadedDocument>,
) -> Option<UploadedDocument> {
    let Some(document) = document.filter(|doc| !doc.original_name.trim().is_empty()) else {
        errors.push(field, "This field is required.");
        return None;
    };

    let mut valid = true;
    if document.bytes.is_empty() {
        errors.push(field, "Uploaded file is empty.");
        valid = false;
    }
    if document.bytes.len() > MAX_DOCUMENT_BYTES {
        errors.push(field, "File must be 16 MB or smaller.");
        valid = false;
    }
    if document.allowed_extension().is_none() {
        errors.push(field, "File type must be one of: pdf, jpg, jpeg, png.");
        valid = false;
    }
    valid.then(|| document.clone())
}
