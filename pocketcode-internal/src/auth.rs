use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AuthenticationInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyMetadata {
    pub user_id: String,
}

/// Maps hashed API keys to the user they belong to
pub type ApiKeyTable = HashMap<String, ApiKeyMetadata>;

// Keys are only ever stored hashed, with a "pocketcode-" prefix
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"pocketcode-");
    hasher.update(api_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Debug)]
pub struct Auth {
    api_keys: Arc<ApiKeyTable>,
}

impl Auth {
    pub fn new(api_keys: ApiKeyTable) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
        }
    }

    pub fn validate_api_key(&self, api_key: &str) -> Option<&ApiKeyMetadata> {
        self.api_keys.get(&hash_api_key(api_key))
    }

    pub fn is_empty(&self) -> bool {
        self.api_keys.is_empty()
    }
}

/// Identity of the caller, attached to the request extensions by [`resolve_identity`].
///
/// Also usable as an extractor on routes that require a user but are not usage-gated;
/// extraction fails with `Unauthenticated` when no identity was attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| Error::new(ErrorDetails::Unauthenticated))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Work out who is calling, if anyone.
pub fn identify(auth: &AuthenticationInfo, headers: &HeaderMap) -> Option<AuthenticatedUser> {
    match auth {
        AuthenticationInfo::Enabled(auth) => {
            let key = bearer_token(headers)?;
            match auth.validate_api_key(key) {
                Some(metadata) => Some(AuthenticatedUser {
                    user_id: metadata.user_id.clone(),
                }),
                None => {
                    tracing::debug!("Request carried an unrecognized API key");
                    None
                }
            }
        }
        AuthenticationInfo::Disabled { mock_user_id } => {
            mock_user_id.as_ref().map(|user_id| AuthenticatedUser {
                user_id: user_id.clone(),
            })
        }
    }
}

/// Attaches an [`AuthenticatedUser`] to the request when the caller can be identified.
///
/// Never rejects. Routes decide for themselves whether an identity is required.
pub async fn resolve_identity(
    State(auth): State<AuthenticationInfo>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(user) = identify(&auth, request.headers()) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn enabled_auth() -> AuthenticationInfo {
        let mut api_keys = ApiKeyTable::new();
        api_keys.insert(
            hash_api_key("test-key"),
            ApiKeyMetadata {
                user_id: "user-1".to_string(),
            },
        );
        AuthenticationInfo::Enabled(Auth::new(api_keys))
    }

    fn headers_with_authorization(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_hash_api_key() {
        assert_eq!(
            hash_api_key("test-key"),
            "c8c26b9425de675f6b072f76d9f8ff98d0688e5af64827ee5b27822b66080245"
        );
        assert_eq!(
            hash_api_key(""),
            "eda61f816825976c43bee7e2ee2f0d898d480b438f556ccbecf0dec94bff1a6e"
        );
        assert_ne!(hash_api_key("test-key"), hash_api_key("test-key2"));
    }

    #[test]
    fn test_identify_valid_key() {
        let user = identify(&enabled_auth(), &headers_with_authorization("Bearer test-key"));
        assert_eq!(
            user,
            Some(AuthenticatedUser {
                user_id: "user-1".to_string()
            })
        );
    }

    #[test]
    fn test_identify_rejects_unknown_or_malformed_keys() {
        let auth = enabled_auth();
        assert_eq!(identify(&auth, &HeaderMap::new()), None);
        assert_eq!(
            identify(&auth, &headers_with_authorization("Bearer other-key")),
            None
        );
        // The raw key without the scheme is not accepted
        assert_eq!(identify(&auth, &headers_with_authorization("test-key")), None);
        assert_eq!(identify(&auth, &headers_with_authorization("Bearer ")), None);
    }

    #[test]
    fn test_identify_disabled() {
        let auth = AuthenticationInfo::Disabled {
            mock_user_id: Some("dev-user".to_string()),
        };
        // Headers are ignored entirely when authentication is disabled
        let user = identify(&auth, &headers_with_authorization("Bearer test-key"));
        assert_eq!(user.map(|u| u.user_id), Some("dev-user".to_string()));

        let anonymous = AuthenticationInfo::Disabled { mock_user_id: None };
        assert_eq!(identify(&anonymous, &HeaderMap::new()), None);
    }
}
