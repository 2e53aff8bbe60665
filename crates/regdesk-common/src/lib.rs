pub mod choice;
pub mod error;
pub mod registration;

pub use choice::{AcademicLevel, Choice, HowHeard, IasCourse, UserType};
pub use error::{Error, Result};
pub use registration::{NewRegistration, Registration};

/// Replaces any credential before it reaches a log line or diagnostic.
pub const SECRET_PLACEHOLDER: &str = "***";
