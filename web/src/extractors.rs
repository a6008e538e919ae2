//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request correlation id (header or freshly generated)
//! - `ClientIp`: client address from proxy headers or the connection
//! - `UserAgent`: the `User-Agent` header
//! - `BearerToken`: the session token from `Authorization` or `?access_token=`

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Query},
    http::{HeaderMap, header, request::Parts},
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use talkboard_auth::AuthError;
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Reuses the id the correlation middleware stored in the request
/// extensions, then the `X-Correlation-ID` header, then a new UUID v4.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| {
                parts
                    .headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Client IP address.
///
/// # Priority
///
/// 1. `X-Forwarded-For` (first IP in the list)
/// 2. `X-Real-IP`
/// 3. Connection IP, when the server was started with connect info
/// 4. `127.0.0.1`
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = extract_client_ip(&parts.headers, parts.extensions.get());
        Ok(Self(ip))
    }
}

fn extract_client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    let real_ip = || {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    };

    forwarded
        .or_else(real_ip)
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// User-Agent header, or `"Unknown"`.
#[derive(Debug, Clone)]
pub struct UserAgent(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserAgent
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Unknown")
            .to_string();

        Ok(Self(user_agent))
    }
}

/// Opaque session token.
///
/// Read from `Authorization: Bearer <token>`. Browsers cannot set headers on
/// a WebSocket handshake, so `?access_token=<token>` is accepted as well.
/// Rejects with 401 when neither is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let token = from_header.or_else(|| {
            Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(mut params)| params.remove("access_token"))
                .filter(|t| !t.is_empty())
        });

        token.map(Self).ok_or_else(|| AuthError::MissingToken.into())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use axum::http::{Request, StatusCode};

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let mut parts = parts(
            Request::builder()
                .header(CORRELATION_ID_HEADER, uuid.to_string())
                .body(())
                .expect("Valid request"),
        );

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_middleware_value() {
        let stored = Uuid::new_v4();
        let mut parts = parts(
            Request::builder()
                .header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string())
                .body(())
                .expect("Valid request"),
        );
        parts.extensions.insert(stored);

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(correlation_id.0, stored);
    }

    #[tokio::test]
    async fn test_client_ip_from_x_forwarded_for() {
        let mut parts = parts(
            Request::builder()
                .header("X-Forwarded-For", "203.0.113.1, 198.51.100.1")
                .body(())
                .expect("Valid request"),
        );

        let client_ip = ClientIp::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(client_ip.0.to_string(), "203.0.113.1");
    }

    #[tokio::test]
    async fn test_client_ip_from_connection() {
        let mut parts = parts(Request::builder().body(()).expect("Valid request"));
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 7], 4000))));

        let client_ip = ClientIp::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(client_ip.0.to_string(), "198.51.100.7");
    }

    #[tokio::test]
    async fn test_client_ip_fallback() {
        let mut parts = parts(Request::builder().body(()).expect("Valid request"));
        let client_ip = ClientIp::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(client_ip.0.to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_user_agent_fallback() {
        let mut parts = parts(Request::builder().body(()).expect("Valid request"));
        let user_agent = UserAgent::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(user_agent.0, "Unknown");
    }

    #[tokio::test]
    async fn test_bearer_token_from_header() {
        let mut parts = parts(
            Request::builder()
                .header(header::AUTHORIZATION, "Bearer abc123")
                .body(())
                .expect("Valid request"),
        );
        let token = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(token, BearerToken("abc123".into()));
    }

    #[tokio::test]
    async fn test_bearer_token_from_query() {
        let mut parts = parts(
            Request::builder()
                .uri("/api/talks/1/live?access_token=xyz")
                .body(())
                .expect("Valid request"),
        );
        let token = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(token.0, "xyz");
    }

    #[tokio::test]
    async fn test_missing_bearer_token_is_unauthorized() {
        let mut parts = parts(
            Request::builder()
                .header(header::AUTHORIZATION, "Basic dXNlcjpwdw==")
                .body(())
                .expect("Valid request"),
        );
        let err = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect_err("no bearer token");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
