use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{delivery::DeliveryError, signature::SignatureError},
    infra::error::InfraError,
};

/// Diagnostic detail attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Error response with a fixed public message and a private report.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<DeliveryError> for HttpError {
    fn from(error: DeliveryError) -> Self {
        const SOURCE: &str = "infra::http::delivery_error_to_http_error";
        if error.is_not_found() {
            return HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Not found", &error);
        }
        match error {
            DeliveryError::Configuration(_) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service misconfigured",
                &error,
            ),
            _ => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Upstream delivery failed",
                &error,
            ),
        }
    }
}

impl From<SignatureError> for HttpError {
    fn from(error: SignatureError) -> Self {
        HttpError::from_error(
            "infra::http::webhook::verify_signature",
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            &error,
        )
    }
}

/// Failure that aborts a binary command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode as UpstreamStatus;

    use super::*;

    fn upstream(status: UpstreamStatus) -> DeliveryError {
        DeliveryError::Status {
            status,
            body: "{}".to_string(),
        }
    }

    #[test]
    fn upstream_not_found_maps_to_404() {
        let response = HttpError::from(upstream(UpstreamStatus::NOT_FOUND)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn upstream_failure_maps_to_bad_gateway() {
        let error = HttpError::from(upstream(UpstreamStatus::SERVICE_UNAVAILABLE));
        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn report_collects_error_chain() {
        let error = AppError::from(InfraError::configuration("missing project id"));
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(report.messages[0], "configuration error: missing project id");
    }

    #[test]
    fn signature_errors_are_unauthorized() {
        let response = HttpError::from(SignatureError::Mismatch).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn command_errors_keep_their_source_message() {
        let error = AppError::from(SignatureError::NotConfigured);
        assert_eq!(error.to_string(), SignatureError::NotConfigured.to_string());
    }
}
