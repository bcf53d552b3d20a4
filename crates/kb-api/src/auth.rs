//! Bearer-token authentication and role enforcement.
//!
//! Tokens come from `[[auth.tokens]]` in the configuration. `require_auth`
//! resolves the caller into a [`Principal`] request extension;
//! `require_admin` runs after it and rejects non-admin callers.

use std::collections::HashMap;
use std::path::Path;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;

use kb_core::config::TokenEntry;
use kb_core::types::Principal;

use crate::error::ApiError;
use crate::state::AppState;

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Load a token from `token_path`, or generate one and save it there with
/// owner-only permissions.
pub fn load_or_generate_token(token_path: &Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(token_path) {
        let token = contents.trim().to_string();
        if !token.is_empty() {
            tracing::info!(path = %token_path.display(), "Admin token loaded");
            return token;
        }
    }

    let token = generate_token();

    if let Some(parent) = token_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, path = %parent.display(), "Failed to create token directory");
        }
    }
    if let Err(e) = std::fs::write(token_path, &token) {
        tracing::warn!(error = %e, path = %token_path.display(), "Failed to save admin token");
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(token_path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "Failed to restrict admin token permissions");
            }
        }
        tracing::info!(path = %token_path.display(), "Admin token generated");
    }

    token
}

/// Token to principal lookup table.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    principals: HashMap<String, Principal>,
}

impl TokenRegistry {
    pub fn from_entries(entries: &[TokenEntry]) -> Self {
        let principals = entries
            .iter()
            .filter(|e| !e.token.trim().is_empty())
            .map(|e| (e.token.clone(), Principal::new(e.username.clone(), e.role)))
            .collect();
        Self { principals }
    }

    pub fn resolve(&self, token: &str) -> Option<&Principal> {
        self.principals.get(token)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// `Ok(None)` when the header is absent; `Err` when it is present but
/// unusable.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| {
        ApiError::Unauthorized("Invalid Authorization header encoding".to_string())
    })?;
    value
        .strip_prefix("Bearer ")
        .map(|t| Some(t.trim()))
        .ok_or_else(|| ApiError::Unauthorized("Expected a Bearer token".to_string()))
}

/// Resolve the caller from headers, if a valid token is present.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = bearer_token(headers)?
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
    state
        .tokens
        .resolve(token)
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("Invalid bearer token".to_string()))
}

/// Middleware: authenticate the caller and attach its [`Principal`].
///
/// Returns 401 when the token is missing or unknown.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authenticate(&state, req.headers()) {
        Ok(principal) => {
            tracing::debug!(user = %principal.username, role = principal.role.as_str(), "Authenticated");
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Middleware: allow only admins. Must run after [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    let denied = match req.extensions().get::<Principal>() {
        Some(p) if p.is_admin() => None,
        Some(p) => {
            tracing::warn!(user = %p.username, path = %req.uri().path(), "Admin route denied");
            Some(ApiError::Forbidden("Admin role required".to_string()))
        }
        None => Some(ApiError::Unauthorized("Authentication required".to_string())),
    };
    match denied {
        None => next.run(req).await,
        Some(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use kb_core::types::Role;

    #[test]
    fn test_generate_token_is_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_load_or_generate_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("admin.token");
        let first = load_or_generate_token(&path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert_eq!(load_or_generate_token(&path), first);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_registry_resolves_and_skips_blank() {
        let registry = TokenRegistry::from_entries(&[
            TokenEntry {
                token: "a".into(),
                username: "admin".into(),
                role: Role::Admin,
            },
            TokenEntry {
                token: " ".into(),
                username: "ghost".into(),
                role: Role::User,
            },
        ]);
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("a").unwrap().is_admin());
        assert!(registry.resolve(" ").is_none());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).unwrap().is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());
    }
}
