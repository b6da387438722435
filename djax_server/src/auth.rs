//! Bearer-token auth for the single-record sync endpoint.
//!
//! Token format: `djx_<uuid>.<secret>` (`djx_<uuid>:<secret>` is accepted).
//! Only the SHA-256 of the secret is stored. A token bound to an origin domain
//! only authenticates requests whose `Origin` (or `Referer`) host is that domain
//! or one of its subdomains.

use crate::error::ApiError;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, ORIGIN, REFERER};
use chrono::Utc;
use djax_core::AuthToken;
use djax_core::store::TokenStore;
use sha2::{Digest, Sha256};
use ulid::Ulid;
use url::Url;
use uuid::Uuid;

const TOKEN_PREFIX: &str = "djx_";

/// A freshly minted token. `token` is shown once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub record: AuthToken,
}

#[tracing::instrument(level = "info", skip(db))]
pub async fn issue_token<D: TokenStore + ?Sized>(
    db: &D,
    name: &str,
    origin_domain: Option<&str>,
) -> djax_core::Result<IssuedToken> {
    let name = name.trim();
    if name.is_empty() {
        return Err(djax_core::Error::InvalidInput("token name is empty".to_string()));
    }
    if db.list_auth_tokens().await?.iter().any(|t| t.name == name) {
        return Err(djax_core::Error::Conflict(format!(
            "auth token name already exists: {name}"
        )));
    }
    let origin_domain = origin_domain
        .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|d| !d.is_empty());

    let id = Uuid::new_v4();
    let secret = format!("{}{}", Ulid::new(), Ulid::new());
    let record = AuthToken {
        id,
        name: name.to_string(),
        token_hash: sha256_hex(secret.as_bytes()),
        origin_domain,
        created_at: Utc::now(),
    };
    db.insert_auth_token(&record).await?;
    Ok(IssuedToken {
        token: format_token(id, &secret),
        record,
    })
}

/// Validate the request's bearer token and origin against stored tokens.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn authenticate<D: TokenStore + ?Sized>(
    db: &D,
    headers: &HeaderMap,
) -> Result<AuthToken, ApiError> {
    let authz = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("missing credentials"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("invalid authorization header"))?;
    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::unauthorized("unsupported authorization scheme"))?
        .trim();

    let (id, secret) =
        parse_token(token).ok_or_else(|| ApiError::unauthorized("invalid token format"))?;
    let Some(record) = db.auth_token_by_id(id).await? else {
        return Err(ApiError::unauthorized("invalid token"));
    };
    if sha256_hex(secret.as_bytes()) != record.token_hash {
        return Err(ApiError::unauthorized("invalid token"));
    }

    if let Some(domain) = record.origin_domain.as_deref() {
        let host = request_host(headers)
            .ok_or_else(|| ApiError::unauthorized("token requires an Origin or Referer"))?;
        if !host_matches(&host, domain) {
            tracing::warn!(token = %record.name, host = %host, "token used from foreign origin");
            return Err(ApiError::unauthorized("origin not allowed for this token"));
        }
    }
    Ok(record)
}

fn parse_token(token: &str) -> Option<(Uuid, String)> {
    let t = token.trim();
    let t = t.strip_prefix(TOKEN_PREFIX).unwrap_or(t);
    let (id_str, secret) = t.split_once('.').or_else(|| t.split_once(':'))?;
    let id = Uuid::parse_str(id_str.trim()).ok()?;
    let secret = secret.trim();
    if secret.is_empty() {
        return None;
    }
    Some((id, secret.to_string()))
}

pub fn format_token(id: Uuid, secret: &str) -> String {
    format!("{TOKEN_PREFIX}{id}.{secret}")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(out.len() * 2);
    for b in out {
        use std::fmt::Write as _;
        let _ = write!(&mut s, "{:02x}", b);
    }
    s
}

/// Host of the `Origin` header, falling back to `Referer`. Lowercased, port dropped.
fn request_host(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(ORIGIN)
        .or_else(|| headers.get(REFERER))?
        .to_str()
        .ok()?;
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use djax_core::MemorySyncDb;

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (name, value) in pairs {
            h.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        h
    }

    #[test]
    fn token_round_trips_through_format() {
        let id = Uuid::new_v4();
        let (parsed, secret) = parse_token(&format_token(id, "s3cret")).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(secret, "s3cret");
        assert!(parse_token(&format!("djx_{id}:abc")).is_some());
        assert!(parse_token("djx_not-a-uuid.abc").is_none());
        assert!(parse_token(&format!("djx_{id}.")).is_none());
    }

    #[test]
    fn origin_host_matching() {
        let h = headers(&[(ORIGIN, "https://App.Example.com:8443")]);
        assert_eq!(request_host(&h).as_deref(), Some("app.example.com"));
        let h = headers(&[(REFERER, "http://example.com/page?x=1")]);
        assert_eq!(request_host(&h).as_deref(), Some("example.com"));
        let h = headers(&[(REFERER, "https://evil.io\\@example.com/x")]);
        assert_eq!(request_host(&h).as_deref(), Some("evil.io"));
        let h = headers(&[(ORIGIN, "null")]);
        assert_eq!(request_host(&h), None);

        assert!(host_matches("example.com", "example.com"));
        assert!(host_matches("app.example.com", "example.com"));
        assert!(!host_matches("badexample.com", "example.com"));
        assert!(!host_matches("example.com.evil.io", "example.com"));
    }

    #[tokio::test]
    async fn authenticate_checks_secret_and_origin() {
        let db = MemorySyncDb::default();
        let open = issue_token(&db, "open", None).await.unwrap();
        let scoped = issue_token(&db, "scoped", Some("example.com")).await.unwrap();

        let bearer = |t: &str| format!("Bearer {t}");

        let ok = authenticate(&db, &headers(&[(AUTHORIZATION, bearer(&open.token).as_str())]))
            .await
            .unwrap();
        assert_eq!(ok.id, open.record.id);

        assert!(authenticate(&db, &HeaderMap::new()).await.is_err());
        let wrong = format_token(open.record.id, "nope");
        assert!(
            authenticate(&db, &headers(&[(AUTHORIZATION, bearer(&wrong).as_str())]))
                .await
                .is_err()
        );

        let no_origin = headers(&[(AUTHORIZATION, bearer(&scoped.token).as_str())]);
        assert!(authenticate(&db, &no_origin).await.is_err());
        let good = headers(&[
            (AUTHORIZATION, bearer(&scoped.token).as_str()),
            (ORIGIN, "https://www.example.com"),
        ]);
        assert!(authenticate(&db, &good).await.is_ok());
        let bad = headers(&[
            (AUTHORIZATION, bearer(&scoped.token).as_str()),
            (ORIGIN, "https://example.org"),
        ]);
        let err = authenticate(&db, &bad).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let smuggled = headers(&[
            (AUTHORIZATION, bearer(&scoped.token).as_str()),
            (REFERER, "https://evil.io\\@example.com/x"),
        ]);
        assert!(authenticate(&db, &smuggled).await.is_err());
    }

    #[tokio::test]
    async fn token_names_are_unique() {
        let db = MemorySyncDb::default();
        issue_token(&db, "ci", None).await.unwrap();
        assert!(matches!(
            issue_token(&db, "ci", None).await,
            Err(djax_core::Error::Conflict(_))
        ));
    }
}
