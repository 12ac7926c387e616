//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control (RBAC).
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{company_id}:{actor_id}:{secret}
//! ```
//!
//! Every request is scoped to exactly one tenant (`company_id`) and one
//! acting user (`actor_id`); both flow into ledger records and rate change
//! history. There is no tenant-less token.
//!
//! ## Development Mode
//!
//! When no `AUTH_TOKEN` is configured every request runs as `admin`. The
//! tenant comes from the `x-company-id` header (falling back to the
//! configured default tenant) and the actor from `x-actor-id`.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;
use vtax_core::{ActorId, CompanyId};

use crate::error::{AppError, ErrorBody, ErrorDetail};

pub const COMPANY_HEADER: &str = "x-company-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles ordered by privilege: `Operator < Reviewer < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Calculates, persists, applies, voids and adjusts.
    Operator,
    /// Operator plus validation sign-off.
    Reviewer,
    /// Full access, including catalog writes.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Reviewer => "reviewer",
            Self::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "operator" => Some(Self::Operator),
            "reviewer" => Some(Self::Reviewer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, injected by [`auth_middleware`]
/// and extracted in handlers via `FromRequestParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// Tenant every read and write is scoped to.
    pub company_id: CompanyId,
    /// Recorded on status history, change logs and rate edits.
    pub actor_id: ActorId,
}

impl CallerIdentity {
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Returns 403 Forbidden if the caller's role is below `minimum`.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
    /// Tenant used in development mode when no `x-company-id` is sent.
    pub default_company: CompanyId,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("default_company", &self.default_company)
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{role}:{company_id}:{actor_id}:{secret}`.
///
/// The secret is checked before anything else is interpreted, so a caller
/// without the secret learns nothing about which part was malformed.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(4, ':').collect();
    let [role, company, actor, secret] = parts.as_slice() else {
        return Err("invalid token format, expected {role}:{company_id}:{actor_id}:{secret}".into());
    };

    if !constant_time_token_eq(secret, expected_secret) {
        return Err("invalid bearer token".into());
    }

    let role = Role::parse(role).ok_or_else(|| format!("unknown role: {role}"))?;
    let company_id = company
        .parse::<Uuid>()
        .map(CompanyId::from_uuid)
        .map_err(|e| format!("invalid company_id: {e}"))?;
    let actor_id = actor
        .parse::<Uuid>()
        .map(ActorId::from_uuid)
        .map_err(|e| format!("invalid actor_id: {e}"))?;

    Ok(CallerIdentity {
        role,
        company_id,
        actor_id,
    })
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, String> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<Uuid>().ok())
            .map(Some)
            .ok_or_else(|| format!("{name} header is not a UUID")),
    }
}

/// Admin identity for development mode, tenant and actor taken from headers.
fn development_identity(headers: &HeaderMap, config: &AuthConfig) -> Result<CallerIdentity, String> {
    let company_id = header_uuid(headers, COMPANY_HEADER)?
        .map(CompanyId::from_uuid)
        .unwrap_or(config.default_company);
    let actor_id = ActorId::from_uuid(header_uuid(headers, ACTOR_HEADER)?.unwrap_or(Uuid::nil()));
    Ok(CallerIdentity {
        role: Role::Admin,
        company_id,
        actor_id,
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the caller's [`CallerIdentity`].
///
/// Requests without an [`AuthConfig`] extension are rejected.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(config) = request.extensions().get::<AuthConfig>().cloned() else {
        tracing::error!("auth middleware installed without AuthConfig");
        return unauthorized_response("authentication is not configured");
    };

    let identity = match &config.token {
        Some(expected) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(value) => match value.strip_prefix("Bearer ") {
                    Some(provided) => parse_bearer_token(provided, expected),
                    None => {
                        tracing::warn!("authentication failed: non-Bearer authorization scheme");
                        return unauthorized_response("authorization header must use Bearer scheme");
                    }
                },
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    return unauthorized_response("missing authorization header");
                }
            }
        }
        None => development_identity(request.headers(), &config),
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const COMPANY: &str = "0b6f3c2e-0000-4000-8000-000000000001";
    const ACTOR: &str = "5d1c9a77-0000-4000-8000-0000000000aa";

    async fn whoami(caller: CallerIdentity) -> String {
        format!("{}:{}:{}", caller.role.as_str(), caller.company_id, caller.actor_id)
    }

    fn test_app(token: Option<String>) -> Router {
        let auth_config = AuthConfig {
            token,
            default_company: CompanyId::from_uuid(Uuid::nil()),
        };
        Router::new()
            .route("/test", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_with_auth(value: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header("Authorization", value)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn valid_token_injects_identity() {
        let app = test_app(Some("s3cret".into()));
        let response = app
            .oneshot(get_with_auth(&format!("Bearer reviewer:{COMPANY}:{ACTOR}:s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, format!("reviewer:{COMPANY}:{ACTOR}"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let app = test_app(Some("s3cret".into()));
        let response = app
            .oneshot(get_with_auth(&format!("Bearer admin:{COMPANY}:{ACTOR}:nope")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("invalid"));
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let app = test_app(Some("s3cret".into()));
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_string(response).await.contains("missing"));
    }

    #[tokio::test]
    async fn basic_scheme_rejected() {
        let app = test_app(Some("s3cret".into()));
        let response = app.oneshot(get_with_auth("Basic dXNlcjpwYXNz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_string(response).await.contains("Bearer"));
    }

    #[tokio::test]
    async fn development_mode_uses_headers() {
        let app = test_app(None);
        let request = Request::builder()
            .uri("/test")
            .header(COMPANY_HEADER, COMPANY)
            .header(ACTOR_HEADER, ACTOR)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, format!("admin:{COMPANY}:{ACTOR}"));
    }

    #[tokio::test]
    async fn development_mode_rejects_malformed_company_header() {
        let app = test_app(None);
        let request = Request::builder()
            .uri("/test")
            .header(COMPANY_HEADER, "acme")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn token_parsing() {
        let ok = parse_bearer_token(&format!("operator:{COMPANY}:{ACTOR}:k"), "k").unwrap();
        assert_eq!(ok.role, Role::Operator);
        assert_eq!(ok.company_id.to_string(), COMPANY);

        assert!(parse_bearer_token("k", "k").is_err());
        assert!(parse_bearer_token(&format!("root:{COMPANY}:{ACTOR}:k"), "k")
            .unwrap_err()
            .contains("unknown role"));
        assert!(parse_bearer_token(&format!("admin:acme:{ACTOR}:k"), "k")
            .unwrap_err()
            .contains("company_id"));
        // Secrets may contain colons.
        assert!(parse_bearer_token(&format!("admin:{COMPANY}:{ACTOR}:a:b"), "a:b").is_ok());
    }

    #[test]
    fn role_ordering() {
        assert!(Role::Admin > Role::Reviewer);
        assert!(Role::Reviewer > Role::Operator);
        let caller = CallerIdentity {
            role: Role::Reviewer,
            company_id: CompanyId::new(),
            actor_id: ActorId::new(),
        };
        assert!(require_role(&caller, Role::Operator).is_ok());
        assert!(require_role(&caller, Role::Admin).is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let config = AuthConfig {
            token: Some("super-secret".into()),
            default_company: CompanyId::new(),
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
