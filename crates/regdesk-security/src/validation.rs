use std::fmt;
use std::sync::LazyLock;

use regdesk_common::{
    AcademicLevel, Choice, HowHeard, IasCourse, NewRegistration, UserType,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

const MIN_NAME_CHARS: usize = 2;
const MIN_PHONE_CHARS: usize = 10;

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\- ]+$").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Input validation and sanitization for submitted form fields.
pub struct InputValidator;

impl InputValidator {
    /// Remove control characters and surrounding whitespace.
    pub fn sanitize(input: &str) -> String {
        input
            .chars()
            .filter(|c| !c.is_control())
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Sanitize an optional field; blank values become `None`.
    pub fn optional(input: Option<&str>) -> Option<String> {
        input.map(Self::sanitize).filter(|s| !s.is_empty())
    }

    pub fn validate_name(value: &str) -> Result<(), String> {
        if value.chars().count() < MIN_NAME_CHARS {
            return Err(format!("must be at least {MIN_NAME_CHARS} characters"));
        }
        Ok(())
    }

    pub fn validate_phone(value: &str) -> Result<(), String> {
        if value.chars().count() < MIN_PHONE_CHARS {
            return Err(format!("must be at least {MIN_PHONE_CHARS} characters"));
        }
        if !PHONE.is_match(value) {
            return Err("may contain only digits, '+', spaces and dashes".into());
        }
        Ok(())
    }

    pub fn validate_email(value: &str) -> Result<(), String> {
        if !EMAIL.is_match(value) {
            return Err("is not a valid email address".into());
        }
        Ok(())
    }
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every problem found in a submission, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn fields(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.field).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for regdesk_common::Error {
    fn from(e: ValidationErrors) -> Self {
        regdesk_common::Error::Validation(e.to_string())
    }
}

/// Raw `/submit` payload. Every field is optional at this layer so that a
/// missing value is reported alongside the other field errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub university_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<String>,
    pub academic_level: Option<String>,
    pub how_heard: Option<String>,
    pub ias_course: Option<String>,
}

struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    fn reject(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    fn check(
        &mut self,
        field: &'static str,
        value: Option<&str>,
        rule: fn(&str) -> Result<(), String>,
    ) {
        if let Some(value) = value {
            if let Err(message) = rule(value) {
                self.reject(field, message);
            }
        }
    }

    fn required(&mut self, field: &'static str, value: Option<String>) -> Option<String> {
        if value.is_none() {
            self.reject(field, "is required");
        }
        value
    }

    fn choice<C: Choice>(&mut self, field: &'static str, value: Option<&str>) -> Option<C> {
        let value = value?;
        match C::parse_label(value) {
            Ok(choice) => Some(choice),
            Err(e) => {
                self.reject(field, e.to_string());
                None
            }
        }
    }
}

impl RegistrationForm {
    /// Sanitize and check every field, producing a record ready to store.
    pub fn validate(self) -> Result<NewRegistration, ValidationErrors> {
        let mut c = Collector { errors: Vec::new() };

        let first_name = c.required("first_name", InputValidator::optional(self.first_name.as_deref()));
        c.check("first_name", first_name.as_deref(), InputValidator::validate_name);

        let middle_name = InputValidator::optional(self.middle_name.as_deref());
        c.check("middle_name", middle_name.as_deref(), InputValidator::validate_name);

        let last_name = c.required("last_name", InputValidator::optional(self.last_name.as_deref()));
        c.check("last_name", last_name.as_deref(), InputValidator::validate_name);

        let university_id = InputValidator::optional(self.university_id.as_deref());

        let phone = c.required("phone", InputValidator::optional(self.phone.as_deref()));
        c.check("phone", phone.as_deref(), InputValidator::validate_phone);

        let email = InputValidator::optional(self.email.as_deref());
        c.check("email", email.as_deref(), InputValidator::validate_email);

        let user_type = c.required("user_type", InputValidator::optional(self.user_type.as_deref()));
        let user_type = c.choice::<UserType>("user_type", user_type.as_deref());

        let academic_level = c.required(
            "academic_level",
            InputValidator::optional(self.academic_level.as_deref()),
        );
        let academic_level = c.choice::<AcademicLevel>("academic_level", academic_level.as_deref());

        let how_heard = c.required("how_heard", InputValidator::optional(self.how_heard.as_deref()));
        let how_heard = c.choice::<HowHeard>("how_heard", how_heard.as_deref());

        let ias_course = InputValidator::optional(self.ias_course.as_deref());
        let ias_course = c.choice::<IasCourse>("ias_course", ias_course.as_deref());

        match (first_name, last_name, phone, user_type, academic_level, how_heard) {
            (
                Some(first_name),
                Some(last_name),
                Some(phone),
                Some(user_type),
                Some(academic_level),
                Some(how_heard),
            ) if c.errors.is_empty() => Ok(NewRegistration {
                first_name,
                middle_name,
                last_name,
                university_id,
                phone,
                email,
                user_type,
                academic_level,
                how_heard,
                ias_course,
            }),
            _ => Err(ValidationErrors { errors: c.errors }),
        }
    }
}
