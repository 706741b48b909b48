//! Per-request voter identity.
//!
//! An authenticated voter is named by a trusted header set by the upstream
//! identity proxy. Everyone else is an anonymous fingerprint: the hex SHA-256
//! of `client address | user-agent | session salt`, where the salt is a random
//! value carried in a session cookie that [`ensure_session`] issues on first
//! contact. The client address is the peer address unless
//! [`IdentityConfig::trust_forwarded_for`] is set.

use std::{net::SocketAddr, sync::Arc};

use axum::{
  extract::{ConnectInfo, FromRequestParts, Request, State},
  http::{HeaderMap, HeaderValue, header, request::Parts},
  middleware::Next,
  response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use versus_core::{
  notify::NotificationSink,
  store::RankingStore,
  voter::{Fingerprint, Voter},
};

use crate::{AppState, error::ApiError};

/// How callers are identified.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
  /// Trusted header holding the authenticated user's UUID.
  pub user_header:         String,
  /// Name of the cookie carrying the fingerprint salt.
  pub session_cookie:      String,
  /// Read the client address from the first `x-forwarded-for` hop instead
  /// of the peer address. Any client can set that header, so this is only
  /// sound behind a proxy that overwrites it.
  pub trust_forwarded_for: bool,
}

impl Default for IdentityConfig {
  fn default() -> Self {
    Self {
      user_header:         "x-authenticated-user".to_owned(),
      session_cookie:      "versus_session".to_owned(),
      trust_forwarded_for: false,
    }
  }
}

/// The salt for this request, placed in extensions by [`ensure_session`].
#[derive(Debug, Clone)]
pub struct SessionSalt(pub String);

const SESSION_MAX_AGE: u32 = 60 * 60 * 24 * 365;

fn cookie_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(k, _)| *k == name)
    .map(|(_, v)| v)
    .filter(|v| !v.is_empty())
}

/// Middleware: make sure every request carries a session salt, issuing a new
/// cookie when the client has none.
pub async fn ensure_session(
  State(identity): State<Arc<IdentityConfig>>,
  mut req: Request,
  next: Next,
) -> Response {
  let existing = cookie_value(req.headers(), &identity.session_cookie).map(str::to_owned);
  let issued = existing.is_none();
  let salt = existing.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
  req.extensions_mut().insert(SessionSalt(salt.clone()));

  let mut res = next.run(req).await;
  if issued {
    let cookie = format!(
      "{}={salt}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_MAX_AGE}",
      identity.session_cookie
    );
    match HeaderValue::from_str(&cookie) {
      Ok(v) => {
        res.headers_mut().append(header::SET_COOKIE, v);
      }
      Err(e) => tracing::warn!(error = %e, "could not encode session cookie"),
    }
  }
  res
}

fn client_address(parts: &Parts, trust_forwarded_for: bool) -> String {
  let forwarded = parts
    .headers
    .get("x-forwarded-for")
    .filter(|_| trust_forwarded_for)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty());
  if let Some(hop) = forwarded {
    return hop.to_owned();
  }
  parts
    .extensions
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip().to_string())
    .unwrap_or_else(|| "unknown".to_owned())
}

/// Hex SHA-256 over the three identifying parts.
pub fn fingerprint_of(address: &str, user_agent: &str, salt: &str) -> versus_core::Result<Fingerprint> {
  let mut hasher = Sha256::new();
  hasher.update(address.as_bytes());
  hasher.update(b"|");
  hasher.update(user_agent.as_bytes());
  hasher.update(b"|");
  hasher.update(salt.as_bytes());
  Fingerprint::new(hex::encode(hasher.finalize()))
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// Who is making this request.
#[derive(Debug, Clone)]
pub struct VoterContext {
  pub voter:       Voter,
  /// Set when the identity header named a user.
  pub user_id:     Option<Uuid>,
  /// This client's anonymous fingerprint, computed even for authenticated
  /// users so their guest history can be merged.
  pub fingerprint: Fingerprint,
}

impl<S, N> FromRequestParts<AppState<S, N>> for VoterContext
where
  S: RankingStore + 'static,
  N: NotificationSink + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, N>,
  ) -> Result<Self, Self::Rejection> {
    let user_id = match parts.headers.get(state.identity.user_header.as_str()) {
      Some(raw) => {
        let parsed = raw
          .to_str()
          .ok()
          .and_then(|s| Uuid::parse_str(s.trim()).ok())
          .ok_or_else(|| ApiError::Unauthorized("malformed identity header".into()))?;
        Some(parsed)
      }
      None => None,
    };

    let salt = match parts.extensions.get::<SessionSalt>() {
      Some(SessionSalt(s)) => s.clone(),
      None => cookie_value(&parts.headers, &state.identity.session_cookie)
        .unwrap_or_default()
        .to_owned(),
    };
    let user_agent = parts
      .headers
      .get(header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default();
    let fingerprint = fingerprint_of(
      &client_address(parts, state.identity.trust_forwarded_for),
      user_agent,
      &salt,
    )?;

    let voter = match user_id {
      Some(id) => Voter::User(id),
      None => Voter::Anonymous(fingerprint.clone()),
    };
    Ok(VoterContext { voter, user_id, fingerprint })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fingerprint_is_stable_hex() {
    let fp = |addr: &str, salt: &str| fingerprint_of(addr, "curl/8", salt).unwrap();
    let a = fp("10.0.0.1", "salt");
    assert_eq!(a, fp("10.0.0.1", "salt"));
    assert_eq!(a.as_str().len(), 64);
    assert_ne!(a, fp("10.0.0.2", "salt"));
    assert_ne!(a, fp("10.0.0.1", "other"));
  }

  #[test]
  fn forwarded_for_is_ignored_unless_trusted() {
    let (mut parts, ()) = axum::http::Request::builder()
      .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
      .body(())
      .unwrap()
      .into_parts();
    parts
      .extensions
      .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5555))));

    assert_eq!(client_address(&parts, false), "192.0.2.4");
    assert_eq!(client_address(&parts, true), "203.0.113.9");

    parts.extensions.clear();
    assert_eq!(client_address(&parts, false), "unknown");
  }

  #[test]
  fn finds_named_cookie_among_others() {
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; versus_session=abc"));
    assert_eq!(cookie_value(&headers, "versus_session"), Some("abc"));
    assert_eq!(cookie_value(&headers, "missing"), None);

    headers.insert(header::COOKIE, HeaderValue::from_static("versus_session="));
    assert_eq!(cookie_value(&headers, "versus_session"), None);
  }
}
