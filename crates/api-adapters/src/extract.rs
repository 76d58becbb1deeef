//! Request extractors.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts, MatchedPath, Request};
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap};
use domains::{Caller, DomainError};

use crate::error::ApiError;
use crate::state::AppState;

/// The caller behind a valid `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Caller);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| DomainError::Unauthorized("missing bearer token".into()))?;
        let caller = state.identity.verify(token)?;
        Ok(Self(caller))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Address the rate limiter keys on.
///
/// `x-forwarded-for` is only believed when the socket peer is one of
/// `trusted_proxies`; the client is then the rightmost hop that is not itself
/// a trusted proxy. Anything else keys on the peer.
pub fn client_addr(headers: &HeaderMap, extensions: &Extensions, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return "unknown".to_owned();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();
    for hop in hops.into_iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => continue,
            Ok(ip) => return ip.to_string(),
            Err(_) => break,
        }
    }
    peer.to_string()
}

/// Route template (`/api/notes/{id}/purchase`) so labels and limiter keys stay
/// bounded. Unmatched requests share one bucket.
pub fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(ip: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        extensions
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn untrusted_peer_cannot_spoof_forwarded_for() {
        let headers = forwarded("203.0.113.7");
        assert_eq!(client_addr(&headers, &peer([198, 51, 100, 9]), &[]), "198.51.100.9");

        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(client_addr(&headers, &peer([198, 51, 100, 9]), &[proxy]), "198.51.100.9");
    }

    #[test]
    fn trusted_proxy_yields_rightmost_untrusted_hop() {
        let proxies: [IpAddr; 2] = ["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()];
        // the client prepended a fake hop; the proxies appended the real one
        let headers = forwarded("1.2.3.4, 203.0.113.7, 10.0.0.2");
        assert_eq!(client_addr(&headers, &peer([10, 0, 0, 1]), &proxies), "203.0.113.7");

        let headers = forwarded("not-an-ip");
        assert_eq!(client_addr(&headers, &peer([10, 0, 0, 1]), &proxies), "10.0.0.1");
    }

    #[test]
    fn missing_peer_is_unknown() {
        let headers = forwarded("203.0.113.7");
        assert_eq!(client_addr(&headers, &Extensions::new(), &[]), "unknown");
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }
}
