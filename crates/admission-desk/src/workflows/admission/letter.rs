//! Fixed-layout admission letters rendered as single-page PDFs.

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use super::domain::{ApplicationId, ApplicationRecord, Program};

/// Snapshot of everything printed on a letter.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionLetter {
    pub application_id: ApplicationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub program: Program,
    pub gpa: f64,
    pub decision_date: NaiveDate,
}

impl AdmissionLetter {
    pub fn for_record(record: &ApplicationRecord, decision_date: NaiveDate) -> Self {
        Self {
            application_id: record.application_id.clone(),
            first_name: record.applicant.first_name.clone(),
            last_name: record.applicant.last_name.clone(),
            email: record.applicant.email.clone(),
            program: record.academic.program,
            gpa: record.academic.gpa,
            decision_date,
        }
    }

    pub fn student_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Rendering backend for admission letters.
pub trait LetterRenderer: Send + Sync {
    fn render(&self, letter: &AdmissionLetter) -> Result<Vec<u8>, LetterError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LetterError {
    #[error("admission letter rendering failed: {0}")]
    Render(String),
}

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 72;
const BODY_SIZE: i64 = 11;
const LEADING: i64 = 16;
const WRAP_COLUMNS: usize = 78;

#[derive(Debug, Clone)]
pub struct PdfLetterRenderer {
    institution_name: String,
}

impl PdfLetterRenderer {
    pub fn new(institution_name: impl Into<String>) -> Self {
        Self {
            institution_name: institution_name.into(),
        }
    }

    /// Text lines in print order, grouped into blocks with their font.
    fn layout(&self, letter: &AdmissionLetter) -> Vec<Block> {
        let student = letter.student_name();
        let program = letter.program.title();

        let approval = format!(
            "We are pleased to inform you that your application for admission to our {program} \
             program has been approved. Your application ID is {}.",
            letter.application_id
        );
        let confidence = "Based on your academic background and qualifications, we are \
                          confident that you will be a valuable addition to our institution.";
        let farewell = "We look forward to welcoming you to our institution and wish you \
                        success in your academic journey.";

        vec![
            Block::heading(&self.institution_name, 16),
            Block::heading("ADMISSION LETTER", 22),
            Block::body(vec![format!(
                "Date: {}",
                letter.decision_date.format("%B %d, %Y")
            )]),
            Block::details(vec![
                format!("Application ID:  {}", letter.application_id),
                format!("Student Name:    {student}"),
                format!("Email:           {}", letter.email),
                format!("Program:         {program}"),
                format!("GPA:             {:.2}", letter.gpa),
            ]),
            Block::body(vec![format!("Dear {student},")]),
            Block::body(wrap(&approval, WRAP_COLUMNS)),
            Block::body(wrap(confidence, WRAP_COLUMNS)),
            Block::body(vec![
                "Please note the following important information:".to_string(),
                "  - Your application has been reviewed and approved by our admissions committee"
                    .to_string(),
                "  - You will receive further instructions regarding enrollment procedures"
                    .to_string(),
                "  - Please keep this admission letter for your records".to_string(),
            ]),
            Block::body(wrap(farewell, WRAP_COLUMNS)),
            Block::body(vec![
                "Best regards,".to_string(),
                "Admissions Committee".to_string(),
            ]),
        ]
    }

    fn content(&self, letter: &AdmissionLetter) -> Content {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Td",
                vec![Object::Integer(MARGIN), Object::Integer(PAGE_HEIGHT - MARGIN)],
            ),
        ];

        for block in self.layout(letter) {
            operations.push(Operation::new(
                "Tf",
                vec![
                    Object::Name(block.font.to_vec()),
                    Object::Integer(block.size),
                ],
            ));
            operations.push(Operation::new(
                "TL",
                vec![Object::Integer(block.size.max(BODY_SIZE) + 5)],
            ));
            for line in block.lines {
                operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("TL", vec![Object::Integer(LEADING)]));
            operations.push(Operation::new("T*", vec![]));
        }

        operations.push(Operation::new("ET", vec![]));
        Content { operations }
    }
}

impl LetterRenderer for PdfLetterRenderer {
    fn render(&self, letter: &AdmissionLetter) -> Result<Vec<u8>, LetterError> {
        let encoded = self
            .content(letter)
            .encode()
            .map_err(|err| LetterError::Render(err.to_string()))?;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|err| LetterError::Render(err.to_string()))?;
        Ok(buffer)
    }
}

struct Block {
    font: &'static [u8],
    size: i64,
    lines: Vec<String>,
}

impl Block {
    fn heading(text: &str, size: i64) -> Self {
        Self {
            font: b"F2",
            size,
            lines: vec![text.to_string()],
        }
    }

    fn details(lines: Vec<String>) -> Self {
        Self {
            font: b"F2",
            size: BODY_SIZE,
            lines,
        }
    }

    fn body(lines: Vec<String>) -> Self {
        Self {
            font: b"F1",
            size: BODY_SIZE,
            lines,
        }
    }
}

/// Greedy word wrap; words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
