//! Central error → HTTP status mapper for the peer HTTP server (spec §4.F).

use actix_web::body::BoxBody;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::http::wire::ErrorResponse;

/// Taxonomy the central mapper dispatches on (spec §7 Error kinds, minus
/// `Transient`/`Fatal` which are internal to the supervisor and never reach
/// an HTTP handler).
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("redirect to `{0}`")]
    Redirect(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    StatusError(StatusCode, String),
    #[error("internal error: `{0}`")]
    Internal(String),
}

impl HttpError {
    /// Builds a [`HttpError::Redirect`] to `path` on the current master
    /// (spec §4.F "absolute URL composed from masterURL and the original
    /// path").
    pub fn redirect_to(master_url: &str, path: &str) -> Self {
        HttpError::Redirect(format!("{}{}", master_url.trim_end_matches('/'), path))
    }
}

impl ResponseError for HttpError {
    fn status_code(&self) -> StatusCode {
        match self {
            HttpError::Redirect(_) => StatusCode::TEMPORARY_REDIRECT,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            HttpError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::StatusError(code, _) => *code,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        let mut builder = HttpResponse::build(self.status_code());
        if let HttpError::Redirect(location) = self {
            builder.insert_header((header::LOCATION, location.as_str()));
        }
        builder.json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_composes_absolute_url() {
        let err = HttpError::redirect_to("http://10.0.0.1:8528", "/endpoints");
        assert_eq!(err.to_string(), "redirect to `http://10.0.0.1:8528/endpoints`");
        assert_eq!(err.status_code(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            HttpError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HttpError::PreconditionFailed("x".into()).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            HttpError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
