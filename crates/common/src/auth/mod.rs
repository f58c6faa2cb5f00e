//! Caller identity extraction
//!
//! Authentication happens upstream. The authenticating proxy forwards the
//! caller's organization, user id and role as trusted headers; this module
//! turns them into an `AuthContext` for handlers. Header names come from
//! `AuthConfig`.

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

/// Extracted caller identity available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Organization (tenant) the request is scoped to
    pub org_id: Uuid,

    /// Calling user
    pub user_id: Uuid,

    /// Role as sent by the upstream layer; validated where it is used
    pub role: String,

    /// Request ID for tracing
    pub request_id: String,
}

impl AuthContext {
    /// Require the caller's role to be one of `roles`
    pub fn require_role(&self, roles: &[&str]) -> Result<()> {
        let role = self.role.trim().to_lowercase();
        if roles.iter().any(|r| *r == role) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: format!("Role '{}' may not perform this action", self.role),
            })
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn uuid_header(parts: &Parts, name: &str) -> Result<Uuid> {
    let raw = header(parts, name).ok_or_else(|| AppError::Unauthorized {
        message: format!("Missing {} header", name),
    })?;

    Uuid::parse_str(raw).map_err(|_| AppError::Unauthorized {
        message: format!("Invalid {} header", name),
    })
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    AuthConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let config = AuthConfig::from_ref(state);

        let org_id = uuid_header(parts, &config.org_header)?;
        let user_id = uuid_header(parts, &config.user_header)?;
        let role = header(parts, &config.role_header)
            .ok_or_else(|| AppError::Unauthorized {
                message: format!("Missing {} header", config.role_header),
            })?
            .to_string();

        let request_id = header(parts, &config.request_id_header)
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(AuthContext {
            org_id,
            user_id,
            role,
            request_id,
        })
    }
}
