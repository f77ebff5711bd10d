use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use carpool_core::IdentityError;
use carpool_domain::LifecycleError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Lifecycle(err) => match err {
                LifecycleError::Authorization(_) => StatusCode::FORBIDDEN,
                LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
                LifecycleError::AlreadyFinalized(_)
                | LifecycleError::InvalidTransition { .. }
                | LifecycleError::CapacityExceeded { .. } => StatusCode::CONFLICT,
                LifecycleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LifecycleError::CapacityViolation { .. } | LifecycleError::Infrastructure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::Lifecycle(err) => err.kind().as_str(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Lifecycle(err) => {
                if !err.is_domain() {
                    // Already logged in full by the orchestrator
                    tracing::error!("Internal Server Error: {:?}", err);
                }
                err.user_message()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Missing => AppError::Authentication("Se requiere autenticación".into()),
            IdentityError::Invalid(detail) => {
                tracing::debug!("Rejected credentials: {}", detail);
                AppError::Authentication("Credenciales inválidas".into())
            }
            IdentityError::Unavailable(detail) => {
                AppError::Lifecycle(LifecycleError::Infrastructure(format!("identity provider: {}", detail)))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
