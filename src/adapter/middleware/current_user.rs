use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::adapter::handler::error::AppError;

/// 呼び出し元ユーザーを示すヘッダー。認証はゲートウェイで済んでいる前提。
pub const USER_ID_HEADER: &str = "x-user-id";

/// ヘッダーからユーザー ID を取り出す。ない・UUID でない場合は None。
pub fn extract_user_id(parts: &Parts) -> Option<Uuid> {
    let value = parts.headers.get(USER_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(value.trim()).ok()
}

/// CurrentUser は認証済みの呼び出し元。取り出せない場合は 401 を返す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_user_id(parts).map(CurrentUser).ok_or_else(|| {
            AppError::unauthorized(
                "INQUIRY_UNAUTHORIZED",
                "x-user-id header with a valid user id is required",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/inquiries/my/sent");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (parts, _) = builder.body(Body::empty()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn test_valid_header() {
        let user = Uuid::new_v4();
        let mut parts = parts_with(Some(&user.to_string()));
        let current = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(current, CurrentUser(user));
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let mut parts = parts_with(None);
        let err = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_malformed_header() {
        assert!(extract_user_id(&parts_with(Some("user-42"))).is_none());
    }
}
