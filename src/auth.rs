//! 管理员共享密钥校验。
//!
//! A single secret configured at startup gates the admin routes. The check
//! is a plain string comparison with no sessions and no rate limiting.

use axum::body::Body as AxumBody;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json};
use axum::http::{Request, StatusCode};
use axum::{middleware, response::IntoResponse, response::Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::ADMIN_PASSWORD_HEADER;
use crate::error::ApiError;
use crate::http::client_ip;

#[derive(Debug)]
pub struct AdminAuth {
    secret: String,
}

impl AdminAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// 凭据必须非空且与配置的密钥完全一致。
    pub fn verify(&self, credential: Option<&str>) -> bool {
        match credential {
            Some(value) if !value.is_empty() && !self.secret.is_empty() => value == self.secret,
            _ => false,
        }
    }
}

/// 管理接口中间件：校验 `X-Admin-Password` 请求头。
pub async fn require_admin(
    Extension(auth): Extension<Arc<AdminAuth>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let credential = req
        .headers()
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|value| value.to_str().ok());
    if auth.verify(credential) {
        return Ok(next.run(req).await);
    }

    let ip = client_ip(&req)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    warn!(client_ip = ip, path = req.uri().path(), "admin credential rejected");
    Err(ApiError::Unauthorized(
        "Unauthorized: Invalid admin password".into(),
    ))
}

#[derive(Deserialize)]
pub(crate) struct VerifyRequest {
    #[serde(default)]
    password: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct VerifyResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

/// 登录页使用的密码校验接口。
pub async fn verify_admin(
    Extension(auth): Extension<Arc<AdminAuth>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(err) => {
            warn!(error = %err.body_text(), "admin verify body rejected");
            return ApiError::BadRequest(format!("invalid request body: {}", err.body_text()))
                .into_response();
        }
    };
    if auth.verify(payload.password.as_deref()) {
        return Json(VerifyResponse {
            success: true,
            message: None,
        })
        .into_response();
    }
    warn!("admin verify failed");
    (
        StatusCode::UNAUTHORIZED,
        Json(VerifyResponse {
            success: false,
            message: Some("Invalid password"),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_secret_matches() {
        let auth = AdminAuth::new("hunter2");
        assert!(auth.verify(Some("hunter2")));
        assert!(!auth.verify(Some("Hunter2")));
        assert!(!auth.verify(Some("hunter2 ")));
        assert!(!auth.verify(Some("")));
        assert!(!auth.verify(None));
    }

    #[test]
    fn empty_secret_never_matches() {
        let auth = AdminAuth::new("");
        assert!(!auth.verify(Some("")));
        assert!(!auth.verify(None));
    }

    #[tokio::test]
    async fn verify_endpoint_reports_status() {
        let auth = Arc::new(AdminAuth::new("hunter2"));
        let ok = verify_admin(
            Extension(auth.clone()),
            Ok(Json(VerifyRequest {
                password: Some("hunter2".into()),
            })),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::OK);

        let denied =
            verify_admin(Extension(auth), Ok(Json(VerifyRequest { password: None }))).await;
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    }
}
