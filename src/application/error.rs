use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    infra::{error::InfraError, persist::PersistError},
    worker::{FetchError, RegisterError},
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
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

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

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
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
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

impl From<FetchError> for HttpError {
    fn from(error: FetchError) -> Self {
        match &error {
            FetchError::Timeout { .. } => HttpError::from_error(
                "infra::http::proxy",
                StatusCode::GATEWAY_TIMEOUT,
                "Upstream timed out",
                &error,
            ),
            FetchError::Network { .. } => HttpError::from_error(
                "infra::http::proxy",
                StatusCode::BAD_GATEWAY,
                "Upstream unreachable",
                &error,
            ),
            FetchError::InvalidRequest(_) => HttpError::from_error(
                "infra::http::proxy",
                StatusCode::BAD_REQUEST,
                "Request could not be forwarded",
                &error,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Register(RegisterError::Install(_)) => StatusCode::BAD_GATEWAY,
            AppError::Register(RegisterError::Worker(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(InfraError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            AppError::Infra(_) | AppError::Persist(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Request could not be processed",
            AppError::Register(RegisterError::Install(_)) => "Worker install failed",
            AppError::Register(RegisterError::Worker(_)) => "Worker misconfigured",
            AppError::Infra(InfraError::Upstream { .. }) => "Upstream unreachable",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Persist(_) => "Cache storage could not be persisted",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_the_source_chain() {
        let error = RegisterError::Install(crate::worker::InstallError::Fetch {
            url: "https://folio.test/".to_string(),
            source: FetchError::network("https://folio.test/", "offline"),
        });
        let report = ErrorReport::from_error("test", StatusCode::BAD_GATEWAY, &error);
        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[1].contains("offline"));
    }

    #[test]
    fn fetch_errors_map_to_gateway_statuses() {
        let timeout = HttpError::from(FetchError::Timeout {
            url: "https://folio.test/".to_string(),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = HttpError::from(FetchError::network("https://folio.test/", "refused"))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn validation_is_a_client_error() {
        let response = AppError::validation("bad message").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
