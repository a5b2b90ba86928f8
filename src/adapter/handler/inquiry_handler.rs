use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::error::AppError;
use super::AppState;
use crate::adapter::middleware::current_user::CurrentUser;
use crate::usecase::get_inquiry_metadata::{ContactView, InquiryMetadata};
use crate::usecase::list_inquiries::InquiryListKind;
use crate::usecase::open_inquiry::OpenInquiryInput;
use crate::usecase::render_inquiry::{RenderContext, RequestView};
use crate::usecase::respond_inquiry::{Decision, RespondInquiryInput};
use crate::usecase::update_inquiry_contact::UpdateInquiryContactInput;

/// GET /inquiries/my/sent
pub async fn list_sent(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RequestView>>, AppError> {
    list(&state, user_id, InquiryListKind::Sent, params.context()).await
}

/// GET /inquiries/my/received
pub async fn list_received(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RequestView>>, AppError> {
    list(&state, user_id, InquiryListKind::Received, params.context()).await
}

/// GET /inquiries/my/contacts
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RequestView>>, AppError> {
    list(&state, user_id, InquiryListKind::Contacts, params.context()).await
}

async fn list(
    state: &AppState,
    user_id: Uuid,
    kind: InquiryListKind,
    context: RenderContext,
) -> Result<Json<Vec<RequestView>>, AppError> {
    let views = state
        .list_inquiries_uc
        .execute(user_id, kind, context)
        .await?;
    Ok(Json(views))
}

/// GET /inquiries/my/meta-data
pub async fn get_metadata(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<InquiryMetadata>, AppError> {
    let metadata = state.get_metadata_uc.execute(user_id).await?;
    Ok(Json(metadata))
}

/// POST /inquiries/my/meta-data/update-contact
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<UpdateContactRequest>,
) -> Result<Json<ContactView>, AppError> {
    let input = UpdateInquiryContactInput {
        user_id,
        phone: req.phone,
        email: req.email,
    };
    let contact = state.update_contact_uc.execute(&input).await?;
    Ok(Json(ContactView::from(contact)))
}

/// POST /inquiries/:id/send
///
/// 新規作成は 201、逆方向のリクエストと相互成立した場合は 200。
pub async fn send_inquiry(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let target = parse_id(&id)?;
    let anonymous_recipient = match SendInquiryRequest::parse(&body) {
        Ok(flag) => flag,
        Err(err) => {
            state.metrics.record_open_rejected(err.code);
            return Err(err);
        }
    };
    let input = OpenInquiryInput {
        sender_user_id: user_id,
        target,
        anonymous_recipient,
    };

    let output = match state.open_inquiry_uc.execute(&input).await {
        Ok(output) => output,
        Err(e) => {
            let err = AppError::from(e);
            state.metrics.record_open_rejected(err.code);
            return Err(err);
        }
    };

    let (status, outcome) = if output.matched {
        (StatusCode::OK, "matched")
    } else {
        (StatusCode::CREATED, "created")
    };
    state.metrics.record_inquiry_opened(outcome);
    state.metrics.record_transition(output.request.status.as_str());
    state.publish_events(&output.events).await;

    let view = state
        .render_inquiry_uc
        .render(&output.request, user_id, RenderContext::Standard)
        .await?;
    Ok((status, Json(view)).into_response())
}

/// POST /inquiries/:id/accept
pub async fn accept_inquiry(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, AppError> {
    respond(&state, user_id, &id, Decision::Accept).await
}

/// POST /inquiries/:id/reject
pub async fn reject_inquiry(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, AppError> {
    respond(&state, user_id, &id, Decision::Reject).await
}

async fn respond(
    state: &AppState,
    user_id: Uuid,
    id: &str,
    decision: Decision,
) -> Result<Json<RequestView>, AppError> {
    let input = RespondInquiryInput {
        request_id: parse_id(id)?,
        actor_user_id: user_id,
        decision,
    };
    let output = state.respond_inquiry_uc.execute(&input).await?;
    state.metrics.record_transition(output.request.status.as_str());
    state.publish_events(&output.events).await;

    let view = state
        .render_inquiry_uc
        .render(&output.request, user_id, RenderContext::Standard)
        .await?;
    Ok(Json(view))
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id)
        .map_err(|_| AppError::bad_request("INQUIRY_VALIDATION", format!("invalid id: {}", id)))
}

// --- Request / Response types ---

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// true の場合は双方のアイデンティティを伏せて表示する。
    #[serde(default)]
    pub is_anonymous: bool,
}

impl ListParams {
    fn context(&self) -> RenderContext {
        if self.is_anonymous {
            RenderContext::Anonymous
        } else {
            RenderContext::Standard
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendInquiryRequest {
    pub anonymous_recipient: Option<bool>,
}

impl SendInquiryRequest {
    /// 空のボディはフラグ指定なし。それ以外は JSON として厳密に読み、
    /// 読めなければ何も変更する前に検証エラーにする。
    fn parse(body: &[u8]) -> Result<Option<bool>, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match serde_json::from_slice::<SendInquiryRequest>(body) {
            Ok(req) => Ok(req.anonymous_recipient),
            Err(e) if e.is_data() => Err(AppError::validation(
                "anonymous_recipient",
                "must be a boolean",
            )),
            Err(_) => Err(AppError::validation(
                "anonymous_recipient",
                "request body is not valid JSON",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub phone: Option<String>,
    pub email: Option<String>,
}
