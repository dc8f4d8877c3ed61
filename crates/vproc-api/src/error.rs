use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::UNPROCESSABLE_ENTITY, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<vproc_domain::DomainError> for ApiError {
    fn from(e: vproc_domain::DomainError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<vproc_scheduler::SchedulerError> for ApiError {
    fn from(e: vproc_scheduler::SchedulerError) -> Self {
        match e {
            vproc_scheduler::SchedulerError::InsufficientResources(_) => ApiError::unprocessable(e.to_string()),
            vproc_scheduler::SchedulerError::NotFound(_) => ApiError::not_found(e.to_string()),
            vproc_scheduler::SchedulerError::AlreadyTerminal(_) => ApiError::unprocessable(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<vproc_routing::RoutingError> for ApiError {
    fn from(e: vproc_routing::RoutingError) -> Self {
        ApiError::unprocessable(e.to_string())
    }
}

impl From<vproc_store::StoreError> for ApiError {
    fn from(e: vproc_store::StoreError) -> Self {
        match e {
            vproc_store::StoreError::ClusterNotFound(_) => ApiError::not_found(e.to_string()),
            vproc_store::StoreError::InsufficientCapacity { .. } => ApiError::unprocessable(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<vproc_lifecycle::LifecycleError> for ApiError {
    fn from(e: vproc_lifecycle::LifecycleError) -> Self {
        match e {
            vproc_lifecycle::LifecycleError::JobNotFound(_) => ApiError::not_found(e.to_string()),
            _ => ApiError::unprocessable(e.to_string()),
        }
    }
}
