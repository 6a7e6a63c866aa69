use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, error};

use crate::config::{AppConfig, TokenEntry};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub role: Role,
    pub subject: String,
}

pub type Verifier = Arc<dyn Fn(&str) -> Option<Principal> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AuthStrategies {
    verifiers: HashMap<Role, Verifier>,
}

impl AuthStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, role: Role, verifier: F) -> Self
    where
        F: Fn(&str) -> Option<Principal> + Send + Sync + 'static,
    {
        self.verifiers.insert(role, Arc::new(verifier));
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new()
            .register(Role::Admin, static_tokens(Role::Admin, config.admin_tokens.clone()))
            .register(Role::Student, static_tokens(Role::Student, config.student_tokens.clone()))
    }

    pub fn authenticate(&self, role: Role, headers: &HeaderMap) -> Result<Principal, AppError> {
        let Some(verifier) = self.verifiers.get(&role) else {
            error!("no authentication strategy registered for role {}", role);
            return Err(AppError::InternalServerError);
        };
        let token = bearer_token(headers)
            .ok_or_else(|| AppError::Unauthorized("Authorization header not found".to_string()))?;
        (**verifier)(token).ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))
    }
}

/// Accepts exactly the configured tokens for `role`.
pub fn static_tokens(
    role: Role,
    tokens: Vec<TokenEntry>,
) -> impl Fn(&str) -> Option<Principal> + Send + Sync + 'static {
    move |candidate: &str| {
        tokens
            .iter()
            .find(|entry| entry.token == candidate)
            .map(|entry| Principal { role, subject: entry.subject.clone() })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

async fn require(
    role: Role,
    strategies: &AuthStrategies,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = strategies.authenticate(role, req.headers())?;
    debug!("authenticated {} as {}", principal.subject, role);
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn require_admin(
    State(strategies): State<AuthStrategies>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require(Role::Admin, &strategies, req, next).await
}

pub async fn require_student(
    State(strategies): State<AuthStrategies>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require(Role::Student, &strategies, req, next).await
}
