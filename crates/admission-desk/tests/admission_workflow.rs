use std::sync::{Arc, Barrier};
use std::time::Duration;

use admission_desk::auth::{AdminDirectory, AdminIdentity};
use admission_desk::workflows::admission::{
    AdmissionError, AdmissionService, ApplicationForm, ApplicationQuery, ApplicationRepository,
    ApplicationStatus, ApplicationSubmission, DocumentRole, FsDocumentStore, PdfLetterRenderer,
    SqliteApplicationRepository, UploadedDocument,
};

type DiskService = AdmissionService<SqliteApplicationRepository, FsDocumentStore>;

fn ada() -> ApplicationSubmission {
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
        degree_certificate: Some(UploadedDocument::new("degree.pdf", b"%PDF-1.4 degree".to_vec())),
        id_proof: Some(UploadedDocument::new("passport.jpeg", b"\xff\xd8 id".to_vec())),
    }
}

fn reviewer() -> AdminIdentity {
    let mut admins = AdminDirectory::default();
    admins.add_account("registrar", "s3cret");
    admins.verify("registrar", "s3cret").expect("credentials verify")
}

fn open_service(dir: &tempfile::TempDir) -> (DiskService, Arc<SqliteApplicationRepository>) {
    let repository = Arc::new(
        SqliteApplicationRepository::open(dir.path().join("admissions.db"), Duration::from_secs(5))
            .expect("database opens"),
    );
    let documents =
        Arc::new(FsDocumentStore::new(dir.path().join("uploads")).expect("upload dir"));
    let service = AdmissionService::new(
        repository.clone(),
        documents,
        Arc::new(PdfLetterRenderer::new("Analytical University")),
    );
    (service, repository)
}

fn stored_files(dir: &tempfile::TempDir) -> usize {
    let uploads = dir.path().join("uploads");
    std::fs::read_dir(&uploads)
        .expect("uploads readable")
        .map(|entry| {
            let entry = entry.expect("entry");
            std::fs::read_dir(entry.path()).expect("application dir").count()
        })
        .sum()
}

#[test]
fn submission_and_approval_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, _) = open_service(&dir);

    let record = service.submit(ada()).expect("submission accepted");
    assert_eq!(record.status, ApplicationStatus::Pending);
    assert_eq!(stored_files(&dir), 2);

    let approved = service
        .approve(&record.application_id, &reviewer())
        .expect("approved");
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert_eq!(stored_files(&dir), 3);
    drop(service);

    let (reopened, repository) = open_service(&dir);
    let stored = repository
        .fetch(&record.application_id)
        .expect("fetch")
        .expect("present after restart");
    assert_eq!(stored, approved);
    assert_eq!(stored.submitted_at, record.submitted_at);
    assert_eq!(stored.reviewed_by.as_deref(), Some("registrar"));

    let (_, pdf) = reopened
        .admission_letter(&record.application_id)
        .expect("letter available");
    let text = String::from_utf8_lossy(&pdf);
    assert!(text.starts_with("%PDF"));
    assert!(text.contains("Ada Lovelace"));
    assert!(text.contains("Computer Science"));

    let (reference, bytes) = reopened
        .document(&record.application_id, DocumentRole::IdProof)
        .expect("id proof");
    assert!(reference.as_str().ends_with(".jpeg"));
    assert_eq!(bytes, b"\xff\xd8 id");
}

#[test]
fn invalid_submissions_leave_no_trace_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, repository) = open_service(&dir);
    let mut submission = ada();
    submission.form.gpa = "4.5".to_string();

    match service.submit(submission) {
        Err(AdmissionError::Validation(errors)) => assert!(errors.has_field("gpa")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(repository
        .list(&ApplicationQuery::default())
        .expect("list")
        .is_empty());
    assert_eq!(stored_files(&dir), 0);
}

#[test]
fn rejecting_a_rejected_application_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, repository) = open_service(&dir);
    let record = service.submit(ada()).expect("submitted");
    service
        .reject(&record.application_id, &reviewer())
        .expect("rejected");

    match service.reject(&record.application_id, &reviewer()) {
        Err(AdmissionError::InvalidTransition(err)) => {
            assert_eq!(err.current, ApplicationStatus::Rejected)
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    let stored = repository
        .fetch(&record.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, ApplicationStatus::Rejected);
    assert!(stored.admission_letter.is_none());
}

#[test]
fn reviewers_on_separate_connections_cannot_both_decide() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (first, _) = open_service(&dir);
    let (second, repository) = open_service(&dir);
    let record = first.submit(ada()).expect("submitted");

    let barrier = Arc::new(Barrier::new(2));
    let outcomes = std::thread::scope(|scope| {
        let approving = scope.spawn(|| {
            barrier.wait();
            first.approve(&record.application_id, &reviewer())
        });
        let rejecting = scope.spawn(|| {
            barrier.wait();
            second.reject(&record.application_id, &reviewer())
        });
        [
            approving.join().expect("approve thread"),
            rejecting.join().expect("reject thread"),
        ]
    });

    let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let stored = repository
        .fetch(&record.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, winners[0].status);

    let expected_files = if stored.status == ApplicationStatus::Approved { 3 } else { 2 };
    assert_eq!(stored_files(&dir), expected_files);
}
