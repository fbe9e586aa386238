use axum::response::{IntoResponse, Response};
use axum_helpers::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkedEventsError {
    #[error("time in invalid format (try ISO 8601 or yyyy-mm-dd)")]
    InvalidTime(String),

    #[error("Invalid duration supplied. Try '1d' or '2h'.")]
    InvalidDuration(String),

    #[error("bbox must be four comma separated numbers: west,south,east,north (got '{0}')")]
    InvalidBbox(String),

    #[error("Invalid language supplied. Supported languages: {0}")]
    InvalidLanguage(String),

    #[error("{0}")]
    InvalidSearch(String),

    #[error("{kind} with id {id} does not exist")]
    RelatedNotFound { kind: &'static str, id: String },

    #[error("Do not send 'id' when POSTing a new Event (got id='{0}')")]
    ClientSuppliedId(String),

    #[error("Incorrect JSON for '{0}'. Expected an object with '@id'.")]
    MissingRelationId(String),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("User needs to be authenticated.")]
    Unauthenticated,

    #[error("User needs to be authorized to publish events.")]
    NoOrganization,

    #[error("User is connected to multiple organizations. This is currently not supported.")]
    MultipleOrganizations,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid page.")]
    InvalidPage,

    #[error("No serializer registered for searchable type '{0}'")]
    MissingSerializer(String),

    #[error("Search backend error: {0}")]
    Search(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type LinkedEventsResult<T> = Result<T, LinkedEventsError>;

impl From<sea_orm::DbErr> for LinkedEventsError {
    fn from(err: sea_orm::DbErr) -> Self {
        LinkedEventsError::Database(err.to_string())
    }
}

impl From<LinkedEventsError> for AppError {
    fn from(err: LinkedEventsError) -> Self {
        use LinkedEventsError::*;

        match err {
            InvalidTime(_) | InvalidDuration(_) | InvalidBbox(_) | InvalidLanguage(_)
            | InvalidSearch(_) | RelatedNotFound { .. } | ClientSuppliedId(_)
            | MissingRelationId(_) | InvalidPayload(_) => AppError::BadRequest(err.to_string()),
            Unauthenticated => AppError::Unauthorized(err.to_string()),
            NoOrganization | MultipleOrganizations => AppError::Forbidden(err.to_string()),
            NotFound { .. } | InvalidPage => AppError::NotFound(err.to_string()),
            Search(detail) => AppError::Dependency {
                code: ErrorCode::SearchBackendError,
                detail,
            },
            Database(detail) => AppError::Dependency {
                code: ErrorCode::DatabaseError,
                detail,
            },
            MissingSerializer(_) | Internal(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl IntoResponse for LinkedEventsError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
