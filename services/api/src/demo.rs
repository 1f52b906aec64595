use admission_desk::auth::AdminDirectory;
use admission_desk::error::AppError;
use admission_desk::workflows::admission::{
    AdmissionError, AdmissionService, ApplicationForm, ApplicationSubmission, FsDocumentStore,
    PdfLetterRenderer, SqliteApplicationRepository, UploadedDocument,
};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Letterhead printed on the generated admission letter
    #[arg(long, default_value = "Admissions Office")]
    pub(crate) institution: String,
    /// Keep the scratch directory and print where it lives
    #[arg(long)]
    pub(crate) keep: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            institution: "Admissions Office".to_string(),
            keep: false,
        }
    }
}

const DEMO_ADMIN: &str = "demo-admin";
const DEMO_PASSWORD: &str = "demo-password";

fn sample_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        form: ApplicationForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@x.org".to_string(),
            phone: "1234567890".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            address: "10 Analytical Engine Way".to_string(),
            program: "computer_science".to_string(),
            previous_education: "Private tutoring in mathematics".to_string(),
            gpa: "3.9".to_string(),
        },
        degree_certificate: Some(UploadedDocument::new(
            "degree.pdf",
            b"%PDF-1.4 sample degree".to_vec(),
        )),
        id_proof: Some(UploadedDocument::new(
            "passport.png",
            b"\x89PNG sample id".to_vec(),
        )),
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let scratch = tempfile::Builder::new()
        .prefix("admission-desk-demo-")
        .tempdir()?;
    demo_in(scratch.path(), &args.institution)?;

    if args.keep {
        let kept: PathBuf = scratch.into_path();
        println!("\nScratch directory kept at {}", kept.display());
    }
    Ok(())
}

fn demo_in(root: &Path, institution: &str) -> Result<(), AppError> {
    let repository = Arc::new(SqliteApplicationRepository::open(
        root.join("admissions.db"),
        Duration::from_secs(5),
    )?);
    let documents = Arc::new(FsDocumentStore::new(root.join("uploads"))?);
    let service = AdmissionService::new(
        repository,
        documents,
        Arc::new(PdfLetterRenderer::new(institution)),
    );

    let mut admins = AdminDirectory::default();
    admins.add_account(DEMO_ADMIN, DEMO_PASSWORD);
    let reviewer = admins
        .verify(DEMO_ADMIN, DEMO_PASSWORD)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::PermissionDenied, err))?;

    println!("Admission desk demo");

    let mut invalid = sample_submission();
    invalid.form.gpa = "4.5".to_string();
    match service.submit(invalid) {
        Err(AdmissionError::Validation(errors)) => {
            println!("Submission with GPA 4.5 refused:");
            for error in &errors.0 {
                println!("  {}: {}", error.field, error.message);
            }
        }
        Ok(record) => println!("Unexpectedly accepted {}", record.application_id),
        Err(other) => return Err(other.into()),
    }

    let record = service.submit(sample_submission())?;
    println!(
        "\nSubmitted {} for {} ({})",
        record.application_id,
        record.applicant.full_name(),
        record.academic.program.title()
    );
    println!("  Status: {}", record.status);

    let approved = service.approve(&record.application_id, &reviewer)?;
    println!(
        "  Status after review by {}: {}",
        reviewer.username(),
        approved.status
    );

    let (_, letter) = service.admission_letter(&record.application_id)?;
    println!("  Admission letter: {} bytes of PDF", letter.len());

    match service.reject(&record.application_id, &reviewer) {
        Err(err @ AdmissionError::InvalidTransition(_)) => {
            println!("  Second decision refused: {err}");
        }
        Ok(_) => println!("  Second decision unexpectedly accepted"),
        Err(other) => return Err(other.into()),
    }

    let (counts, _) = service.dashboard()?;
    println!(
        "\nTotals: {} application(s), {} pending, {} approved, {} rejected",
        counts.total, counts.pending, counts.approved, counts.rejected
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_end_to_end_in_a_scratch_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        demo_in(dir.path(), "Analytical University").expect("demo completes");

        assert!(dir.path().join("admissions.db").exists());
        let application_dirs: Vec<_> = std::fs::read_dir(dir.path().join("uploads"))
            .expect("uploads")
            .collect();
        assert_eq!(application_dirs.len(), 1);
    }

    #[test]
    fn run_demo_cleans_up_by_default() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }
}
