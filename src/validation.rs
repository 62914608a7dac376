use crate::error::AppError;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
    /// Fallback surface the client should show instead of the requested view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default)]
    pub dismissable: bool,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
            surface: None,
            dismissable: false,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }

    pub fn with_surface(mut self, surface: &str) -> Self {
        self.surface = Some(surface.to_string());
        self
    }

    pub fn dismissable(mut self) -> Self {
        self.dismissable = true;
        self
    }

    fn from_field_errors(errors: &validator::ValidationErrors) -> Self {
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Self::new(error_map)
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>>;
}

impl ToValidationResponse for AppError {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        let status = self.status_code();

        let body = match &self {
            AppError::Database(_) => {
                ValidationResponse::with_error("database", "Database error").dismissable()
            }
            AppError::Authentication(msg) => {
                ValidationResponse::with_error("authentication", msg).with_surface("need-login")
            }
            AppError::Authorization(msg) => {
                ValidationResponse::with_error("authorization", &format!("Permission denied: {}", msg))
                    .with_surface("access-denied")
            }
            AppError::UpgradeRequired(msg) => {
                ValidationResponse::with_error("authorization", msg).with_surface("upgrade-required")
            }
            AppError::NotFound(msg) => {
                ValidationResponse::with_error("resource", &format!("Not found: {}", msg))
            }
            AppError::Validation(msg) => ValidationResponse::with_error("request", msg),
            AppError::InvalidPayload(errors) => ValidationResponse::from_field_errors(errors),
            AppError::Mutation(msg) => ValidationResponse::with_error("mutation", msg).dismissable(),
            AppError::Storage(msg) => {
                ValidationResponse::with_error("storage", &format!("Storage error: {}", msg))
                    .dismissable()
            }
            AppError::Internal(_) => ValidationResponse::with_error("server", "Internal server error"),
        };

        Custom(status, Json(body))
    }
}

pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}
