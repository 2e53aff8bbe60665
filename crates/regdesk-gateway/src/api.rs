use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::HeaderMap;
use regdesk_common::Registration;
use regdesk_security::RegistrationForm;
use regdesk_security::api_key::API_KEY_HEADER;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ApiError;
use crate::state::SharedState;

pub const SUBMIT_SUCCESS_MESSAGE: &str = "تم التسجيل بنجاح";

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub message: &'static str,
    pub data: Registration,
}

#[derive(Debug, Serialize)]
pub struct RegistrationsList {
    pub registrations: Vec<Registration>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

pub async fn submit(
    State(state): State<SharedState>,
    form: Result<Form<RegistrationForm>, FormRejection>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::malformed_body(e.body_text()))?;
    let new = form.validate()?;

    let registration = state.store.insert(new).await?;
    info!("registration {} submitted", registration.id);

    Ok(Json(RegistrationResponse {
        message: SUBMIT_SUCCESS_MESSAGE,
        data: registration,
    }))
}

pub async fn list_registrations(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<RegistrationsList>, ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    state.api_key.check(provided)?;

    let registrations = state.store.list().await?;
    Ok(Json(RegistrationsList { registrations }))
}
