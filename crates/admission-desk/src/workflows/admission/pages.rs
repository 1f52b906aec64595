//! Server-rendered HTML for the public form and the admin login.

use std::fmt::Write;

use super::domain::Program;
use super::validation::{ApplicationForm, ValidationErrors, ALLOWED_EXTENSIONS};

pub(crate) fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n</head>\n<body>\n<main>\n{body}</main>\n</body>\n</html>\n",
        escape(title)
    )
}

pub(crate) fn landing() -> String {
    let mut programs = String::new();
    for program in Program::ALL {
        let _ = writeln!(programs, "<li>{}</li>", escape(program.title()));
    }
    let body = format!(
        "<h1>Student Admissions</h1>\n\
         <p>Apply online, then track your application with the id you receive.</p>\n\
         <h2>Programs</h2>\n<ul>\n{programs}</ul>\n\
         <p><a href=\"/apply\">Start an application</a></p>\n\
         <p><a href=\"/admin/login\">Administrator login</a></p>\n"
    );
    layout("Student Admissions", &body)
}

struct TextField {
    name: &'static str,
    label: &'static str,
    kind: &'static str,
}

const TEXT_FIELDS: [TextField; 6] = [
    TextField {
        name: "first_name",
        label: "First Name",
        kind: "text",
    },
    TextField {
        name: "last_name",
        label: "Last Name",
        kind: "text",
    },
    TextField {
        name: "email",
        label: "Email",
        kind: "email",
    },
    TextField {
        name: "phone",
        label: "Phone",
        kind: "tel",
    },
    TextField {
        name: "date_of_birth",
        label: "Date of Birth",
        kind: "date",
    },
    TextField {
        name: "gpa",
        label: "GPA",
        kind: "text",
    },
];

fn field_value<'a>(form: &'a ApplicationForm, name: &str) -> &'a str {
    match name {
        "first_name" => &form.first_name,
        "last_name" => &form.last_name,
        "email" => &form.email,
        "phone" => &form.phone,
        "date_of_birth" => &form.date_of_birth,
        "gpa" => &form.gpa,
        "address" => &form.address,
        "previous_education" => &form.previous_education,
        _ => "",
    }
}

fn field_errors(out: &mut String, errors: &ValidationErrors, field: &str) {
    for error in errors.for_field(field) {
        let _ = writeln!(out, "<p class=\"error\">{}</p>", escape(&error.message));
    }
}

/// The application form, pre-filled with `form` and annotated with `errors`.
pub(crate) fn apply_form(form: &ApplicationForm, errors: &ValidationErrors) -> String {
    let mut body = String::from("<h1>Apply for Admission</h1>\n");
    if !errors.is_empty() {
        body.push_str("<p class=\"error\">Please correct the errors below.</p>\n");
    }
    body.push_str(
        "<form method=\"post\" action=\"/apply\" enctype=\"multipart/form-data\">\n",
    );

    for field in &TEXT_FIELDS {
        let _ = writeln!(
            body,
            "<label for=\"{name}\">{label}</label>\n\
             <input id=\"{name}\" name=\"{name}\" type=\"{kind}\" value=\"{value}\">",
            name = field.name,
            label = field.label,
            kind = field.kind,
            value = escape(field_value(form, field.name)),
        );
        field_errors(&mut body, errors, field.name);
    }

    for (name, label) in [("address", "Address"), ("previous_education", "Previous Education")] {
        let _ = writeln!(
            body,
            "<label for=\"{name}\">{label}</label>\n\
             <textarea id=\"{name}\" name=\"{name}\">{}</textarea>",
            escape(field_value(form, name)),
        );
        field_errors(&mut body, errors, name);
    }

    body.push_str(
        "<label for=\"program\">Program</label>\n<select id=\"program\" name=\"program\">\n",
    );
    body.push_str("<option value=\"\">Select a program</option>\n");
    for program in Program::ALL {
        let selected = if form.program.trim() == program.code() {
            " selected"
        } else {
            ""
        };
        let _ = writeln!(
            body,
            "<option value=\"{}\"{selected}>{}</option>",
            program.code(),
            escape(program.title())
        );
    }
    body.push_str("</select>\n");
    field_errors(&mut body, errors, "program");

    let accept = ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");
    for (name, label) in [
        ("degree_certificate", "Degree Certificate"),
        ("id_proof", "ID Proof"),
    ] {
        let _ = writeln!(
            body,
            "<label for=\"{name}\">{label}</label>\n\
             <input id=\"{name}\" name=\"{name}\" type=\"file\" accept=\"{accept}\">"
        );
        field_errors(&mut body, errors, name);
    }

    body.push_str("<button type=\"submit\">Submit Application</button>\n</form>\n");
    layout("Apply for Admission", &body)
}

pub(crate) fn login_form(error: Option<&str>) -> String {
    let mut body = String::from("<h1>Administrator Login</h1>\n");
    if let Some(message) = error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", escape(message));
    }
    body.push_str(
        "<form method=\"post\" action=\"/admin/login\">\n\
         <label for=\"username\">Username</label>\n\
         <input id=\"username\" name=\"username\" type=\"text\">\n\
         <label for=\"password\">Password</label>\n\
         <input id=\"password\" name=\"password\" type=\"password\">\n\
         <button type=\"submit\">Log In</button>\n</form>\n",
    );
    layout("Administrator Login", &body)
}
