use axum::{extract::FromRequestParts, http::{header::AUTHORIZATION, request::Parts, HeaderMap}};
use serde::{Deserialize, Serialize};

use crate::{AppError, Reject};

pub const TOKEN_HEADER: &str = "x-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token required")]
    Missing,
    #[error("invalid token")]
    Invalid,
    #[error("user id {0} is not numeric")]
    NotNumeric(String),
}

impl User {
    /// Sender of server-originated messages.
    pub fn system() -> Self {
        Self {
            id: "system".to_owned(),
            username: "System".to_owned(),
            role: Role::System,
        }
    }

    /// Relational tables key users by integer: `user_42` is user 42.
    pub fn numeric_id(&self) -> Result<i64, AuthError> {
        self.id
            .split_once('_')
            .and_then(|(_, suffix)| suffix.parse().ok())
            .ok_or_else(|| AuthError::NotNumeric(self.id.clone()))
    }

    pub fn require_admin(&self) -> Result<(), Reject> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(Reject::Forbidden("administrator role required".to_owned())),
        }
    }
}

pub fn validate_token(token: &str) -> Result<User, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }

    let (role, name) = if let Some(name) = token.strip_prefix("user_") {
        (Role::User, name)
    } else if let Some(name) = token.strip_prefix("admin_") {
        (Role::Admin, name)
    } else {
        return Err(AuthError::Invalid);
    };

    if name.is_empty() {
        return Err(AuthError::Invalid);
    }

    let username = match role {
        Role::Admin => format!("Admin {name}"),
        _ => format!("User {name}"),
    };

    Ok(User {
        id: token.to_owned(),
        username,
        role,
    })
}

/// `x-token` wins over `Authorization: Bearer`.
pub fn token_from(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers.get(TOKEN_HEADER) {
        return token.to_str().ok();
    }

    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl<S: Send + Sync> FromRequestParts<S> for User {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = token_from(&parts.headers).ok_or(AuthError::Missing)?;
        Ok(validate_token(token)?)
    }
}
