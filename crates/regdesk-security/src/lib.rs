pub mod api_key;
pub mod validation;

pub use api_key::ApiKeyGuard;
pub use validation::{FieldError, InputValidator, RegistrationForm, ValidationErrors};
