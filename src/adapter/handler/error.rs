use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::usecase::get_inquiry_metadata::GetInquiryMetadataError;
use crate::usecase::list_inquiries::ListInquiriesError;
use crate::usecase::open_inquiry::OpenInquiryError;
use crate::usecase::render_inquiry::RenderInquiryError;
use crate::usecase::respond_inquiry::RespondInquiryError;
use crate::usecase::update_inquiry_contact::UpdateInquiryContactError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaBody>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaBody {
    pub counter: u32,
    pub limit: u32,
}

/// AppError は HTTP レスポンスに変換されるエラー。
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub quota: Option<QuotaBody>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            quota: None,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INQUIRY_INTERNAL", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(field: &str, message: &str) -> Self {
        let mut details = serde_json::Map::new();
        details.insert(field.to_string(), serde_json::json!([message]));
        Self::bad_request("INQUIRY_VALIDATION", format!("{}: {}", field, message))
            .with_details(serde_json::Value::Object(details))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
                request_id: uuid::Uuid::new_v4().to_string(),
                details: self.details,
                quota: self.quota,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<OpenInquiryError> for AppError {
    fn from(e: OpenInquiryError) -> Self {
        let message = e.to_string();
        match e {
            OpenInquiryError::Validation { field, message } => Self::validation(&field, &message),
            OpenInquiryError::SelfInquiry => Self::bad_request("INQUIRY_SELF", message),
            OpenInquiryError::RecipientNotFound(_) => {
                Self::not_found("INQUIRY_RECIPIENT_NOT_FOUND", message)
            }
            OpenInquiryError::Duplicate(_) => Self::bad_request("INQUIRY_DUPLICATE", message),
            OpenInquiryError::AlreadyAccepted(_) => {
                Self::bad_request("INQUIRY_ALREADY_ACCEPTED", message)
            }
            OpenInquiryError::QuotaExceeded { counter, limit } => {
                let mut err = Self::bad_request("INQUIRY_QUOTA_EXCEEDED", message);
                err.quota = Some(QuotaBody { counter, limit });
                err
            }
            OpenInquiryError::Internal(_) => Self::internal(message),
        }
    }
}

impl From<RespondInquiryError> for AppError {
    fn from(e: RespondInquiryError) -> Self {
        let message = e.to_string();
        match e {
            RespondInquiryError::NotFound(_) => Self::not_found("INQUIRY_NOT_FOUND", message),
            RespondInquiryError::NotOwner => Self::forbidden("INQUIRY_NOT_OWNER", message),
            RespondInquiryError::TransitionNotAllowed { .. } => {
                Self::bad_request("INQUIRY_TRANSITION_NOT_ALLOWED", message)
            }
            RespondInquiryError::Conflict(_) | RespondInquiryError::Internal(_) => {
                Self::internal(message)
            }
        }
    }
}

impl From<UpdateInquiryContactError> for AppError {
    fn from(e: UpdateInquiryContactError) -> Self {
        match e {
            UpdateInquiryContactError::Validation { field, message } => {
                Self::validation(&field, &message)
            }
            UpdateInquiryContactError::Internal(message) => Self::internal(message),
        }
    }
}

impl From<GetInquiryMetadataError> for AppError {
    fn from(e: GetInquiryMetadataError) -> Self {
        let message = e.to_string();
        match e {
            GetInquiryMetadataError::ProfileNotFound(_) => {
                Self::not_found("INQUIRY_PROFILE_NOT_FOUND", message)
            }
            GetInquiryMetadataError::Internal(_) => Self::internal(message),
        }
    }
}

impl From<ListInquiriesError> for AppError {
    fn from(e: ListInquiriesError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<RenderInquiryError> for AppError {
    fn from(e: RenderInquiryError) -> Self {
        let message = e.to_string();
        match e {
            RenderInquiryError::NotParticipant(_) => {
                Self::forbidden("INQUIRY_NOT_OWNER", message)
            }
            RenderInquiryError::Internal(_) => Self::internal(message),
        }
    }
}
