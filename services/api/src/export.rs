use crate::infra::open_repository;
use admission_desk::config::AppConfig;
use admission_desk::error::AppError;
use admission_desk::workflows::admission::{
    ApplicationQuery, ApplicationRecord, ApplicationRepository, ApplicationStatus,
    SubmissionOrder,
};
use chrono::SecondsFormat;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// Destination CSV file
    #[arg(long)]
    pub(crate) output: PathBuf,
    /// Only export applications in this status (pending, approved, rejected)
    #[arg(long, value_parser = parse_status)]
    pub(crate) status: Option<ApplicationStatus>,
}

fn parse_status(raw: &str) -> Result<ApplicationStatus, String> {
    ApplicationStatus::from_label(raw.trim())
        .ok_or_else(|| format!("'{raw}' is not one of pending, approved, rejected"))
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: i64,
    application_id: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    phone: &'a str,
    date_of_birth: String,
    program: &'a str,
    previous_education: &'a str,
    gpa: f64,
    status: &'a str,
    submitted_at: String,
    reviewed_at: Option<String>,
    reviewed_by: Option<&'a str>,
}

impl<'a> From<&'a ApplicationRecord> for ExportRow<'a> {
    fn from(record: &'a ApplicationRecord) -> Self {
        Self {
            id: record.id,
            application_id: record.application_id.as_str(),
            first_name: &record.applicant.first_name,
            last_name: &record.applicant.last_name,
            email: &record.applicant.email,
            phone: &record.applicant.phone,
            date_of_birth: record.applicant.date_of_birth.format("%Y-%m-%d").to_string(),
            program: record.academic.program.code(),
            previous_education: &record.academic.previous_education,
            gpa: record.academic.gpa,
            status: record.status.label(),
            submitted_at: record
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            reviewed_at: record
                .reviewed_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            reviewed_by: record.reviewed_by.as_deref(),
        }
    }
}

/// Serialise records oldest first, one row per application, with a header row.
pub(crate) fn write_csv<W: Write>(records: &[ApplicationRecord], sink: W) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(sink);
    for record in records {
        writer
            .serialize(ExportRow::from(record))
            .map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let repository = open_repository(&config)?;
    let records = repository.list(&ApplicationQuery {
        status: args.status,
        order: SubmissionOrder::Oldest,
    })?;

    let file = std::fs::File::create(&args.output)?;
    write_csv(&records, file)?;
    println!(
        "Exported {} application(s) to {}",
        records.len(),
        args.output.display()
    );
    Ok(())
}
