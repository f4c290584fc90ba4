use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use pathway_protocol::UserId;

/// Resolves the calling user from request headers. `None` means the request
/// is unauthenticated.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<UserId>;
}

/// Fixed `Authorization: Bearer <token>` table loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: pairs
                .into_iter()
                .map(|(token, user)| (token, UserId::from_string(user)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<UserId> {
        let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = raw.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        self.tokens.get(token.trim()).cloned()
    }
}

/// Parses a `TOKEN=USER` command-line pair.
pub fn parse_token_pair(raw: &str) -> Result<(String, String), String> {
    let (token, user) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=USER, got `{raw}`"))?;
    let (token, user) = (token.trim(), user.trim());
    if token.is_empty() || user.is_empty() {
        return Err("token and user must both be non-empty".to_owned());
    }
    Ok((token.to_owned(), user.to_owned()))
}
