//! GraphQL authentication and authorization
//!
//! The HTTP layer resolves the bearer token into an [Actor] before the
//! request reaches the schema; resolvers read it back from the context.
//!
//! ## Guards
//!
//! Use `AuthGuard` to require a signed-in caller:
//!
//! ```ignore
//! #[graphql(guard = "AuthGuard")]
//! async fn protected_query(&self, ctx: &Context<'_>) -> Result<String> { ... }
//! ```
//!
//! Use `StaffGuard` for librarian-only operations:
//!
//! ```ignore
//! #[graphql(guard = "StaffGuard")]
//! async fn staff_only(&self, ctx: &Context<'_>) -> Result<String> { ... }
//! ```

use async_graphql::{Context, ErrorExtensions, Result};
use axum::http::HeaderMap;

use crate::services::Actor;

/// Raw bearer token of the current request, kept for logout
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Where the request came from, for analytics events
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        Self {
            // first hop of a proxy chain
            ip_address: header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(|ip| ip.trim().to_string())
                .or_else(|| header("x-real-ip").map(str::to_string)),
            user_agent: header("user-agent").unwrap_or_default().to_string(),
        }
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn unauthorized() -> async_graphql::Error {
    async_graphql::Error::new("Authentication required")
        .extend_with(|_, e| e.set("code", "UNAUTHORIZED"))
}

/// Extension trait to get the caller from GraphQL context
pub trait AuthExt {
    /// The signed-in caller, or an `UNAUTHORIZED` error
    fn actor(&self) -> Result<&Actor>;

    /// The signed-in caller if there is one
    fn try_actor(&self) -> Option<&Actor>;

    /// Bearer token the request was made with
    fn bearer(&self) -> Result<&str>;
}

impl<'a> AuthExt for Context<'a> {
    fn actor(&self) -> Result<&Actor> {
        self.data_opt::<Actor>().ok_or_else(unauthorized)
    }

    fn try_actor(&self) -> Option<&Actor> {
        self.data_opt::<Actor>()
    }

    fn bearer(&self) -> Result<&str> {
        self.data_opt::<BearerToken>()
            .map(|t| t.0.as_str())
            .ok_or_else(unauthorized)
    }
}

/// Guard that requires authentication.
pub struct AuthGuard;

impl async_graphql::Guard for AuthGuard {
    fn check(&self, ctx: &Context<'_>) -> impl std::future::Future<Output = Result<()>> + Send {
        let result = ctx.actor().map(|_| ());
        async move { result }
    }
}

/// Guard that requires an admin or an active Staff-group member.
pub struct StaffGuard;

impl async_graphql::Guard for StaffGuard {
    fn check(&self, ctx: &Context<'_>) -> impl std::future::Future<Output = Result<()>> + Send {
        let result = ctx.actor().and_then(|actor| {
            if actor.is_staff {
                Ok(())
            } else {
                Err(async_graphql::Error::new("Staff access required")
                    .extend_with(|_, e| e.set("code", "FORBIDDEN")))
            }
        });
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_client_info_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(info.user_agent, "curl/8.0");

        let empty = ClientInfo::from_headers(&HeaderMap::new());
        assert_eq!(empty.ip_address, None);
        assert_eq!(empty.user_agent, "");
    }
}
