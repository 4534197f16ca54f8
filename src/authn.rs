//! Authentication context resolution.
//!
//! Turns the raw `Authorization` header into either a [`Principal`] or the
//! explicit [`Authentication::Unauthenticated`] sentinel. Nothing is cached
//! between requests and no session state is created, so role changes in the
//! provider's user store take effect on the next request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderValue;
use base64ct::{Base64, Encoding};
use miette::Diagnostic;
use thiserror::Error;

use crate::principal::{Principal, RoleHierarchy};
use crate::settings::UserEntry;

/// Why credentials did not resolve to a principal. Internal to the resolver;
/// every variant is reported to callers as `Unauthenticated`.
#[derive(Debug, Error, Diagnostic)]
pub enum AuthnError {
    #[error("Malformed credentials: {0}")]
    #[diagnostic(code(warden::authn::malformed))]
    MalformedCredentials(String),

    #[error("Unknown user")]
    #[diagnostic(code(warden::authn::unknown_user))]
    UnknownUser,

    #[error("Invalid password")]
    #[diagnostic(code(warden::authn::invalid_password))]
    InvalidPassword,

    #[error("User has no roles")]
    #[diagnostic(code(warden::authn::no_roles))]
    NoRoles,

    #[error("Provider failure: {0}")]
    #[diagnostic(code(warden::authn::provider))]
    Provider(String),
}

/// Username and password from a Basic challenge-response header.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_basic_header(value: &HeaderValue) -> Result<Self, AuthnError> {
        let value = value
            .to_str()
            .map_err(|_| AuthnError::MalformedCredentials("non-ASCII header".into()))?;
        // Scheme names are case-insensitive
        let (_, b64) = value
            .split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("Basic"))
            .ok_or_else(|| AuthnError::MalformedCredentials("expected Basic scheme".into()))?;
        let decoded = Base64::decode_vec(b64.trim())
            .map_err(|_| AuthnError::MalformedCredentials("invalid base64".into()))?;
        let s = String::from_utf8(decoded)
            .map_err(|_| AuthnError::MalformedCredentials("invalid UTF-8".into()))?;
        let (username, password) = s
            .split_once(':')
            .ok_or_else(|| AuthnError::MalformedCredentials("missing `:` separator".into()))?;
        if username.is_empty() {
            return Err(AuthnError::MalformedCredentials("empty username".into()));
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// External authentication capability. May block on a backing store; that
/// cost stays inside the resolver.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    async fn verify(&self, credentials: &Credentials) -> Result<Principal, AuthnError>;
}

/// Outcome of resolving a request's credentials.
#[derive(Debug, Clone)]
pub enum Authentication {
    Authenticated(Principal),
    Unauthenticated,
}

impl Authentication {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Authentication::Authenticated(p) => Some(p),
            Authentication::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Authentication::Authenticated(_))
    }
}

#[derive(Clone)]
pub struct Resolver {
    provider: Arc<dyn AuthenticationProvider>,
    roles: Arc<RoleHierarchy>,
}

impl Resolver {
    pub fn new(provider: Arc<dyn AuthenticationProvider>, roles: RoleHierarchy) -> Self {
        Self {
            provider,
            roles: Arc::new(roles),
        }
    }

    /// Never fails: absent, malformed, or rejected credentials all yield
    /// `Unauthenticated`.
    pub async fn resolve(&self, header: Option<&HeaderValue>) -> Authentication {
        let Some(header) = header else {
            return Authentication::Unauthenticated;
        };

        let credentials = match Credentials::from_basic_header(header) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting malformed credentials");
                return Authentication::Unauthenticated;
            }
        };

        match self.provider.verify(&credentials).await {
            Ok(principal) => Authentication::Authenticated(principal.expanded(&self.roles)),
            Err(e) => {
                tracing::debug!(username = %credentials.username, error = %e, "authentication failed");
                Authentication::Unauthenticated
            }
        }
    }
}

#[derive(Debug, Clone)]
struct StaticUser {
    password_hash: String,
    roles: Vec<String>,
}

/// Users from configuration with argon2 PHC password hashes.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    users: HashMap<String, StaticUser>,
    /// Verified against for unknown usernames so both paths pay the same
    /// hashing cost.
    decoy_hash: Option<String>,
}

impl StaticProvider {
    pub fn new(users: &[UserEntry]) -> Self {
        let decoy_hash = users.first().map(|u| u.password_hash.clone());
        let users = users
            .iter()
            .map(|u| {
                (
                    u.username.clone(),
                    StaticUser {
                        password_hash: u.password_hash.clone(),
                        roles: u.roles.clone(),
                    },
                )
            })
            .collect();
        Self { users, decoy_hash }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl AuthenticationProvider for StaticProvider {
    async fn verify(&self, credentials: &Credentials) -> Result<Principal, AuthnError> {
        let Some(user) = self.users.get(&credentials.username).cloned() else {
            if let Some(hash) = self.decoy_hash.clone() {
                let password = credentials.password.clone();
                let _ =
                    tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await;
            }
            return Err(AuthnError::UnknownUser);
        };

        let password = credentials.password.clone();
        let hash = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthnError::Provider(e.to_string()))??;
        if !ok {
            return Err(AuthnError::InvalidPassword);
        }

        Principal::new(credentials.username.clone(), user.roles).ok_or(AuthnError::NoRoles)
    }
}

fn verify_password(password: &str, hash: &str) -> Result<bool, AuthnError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AuthnError::Provider(format!("bad hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Produce an argon2 PHC string for use in the `[[users]]` configuration.
pub fn hash_password(password: &str) -> Result<String, AuthnError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthnError::Provider(format!("password hashing failed: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap argon2 parameters so tests stay fast; verification reads the
    /// parameters back out of the PHC string.
    pub(crate) fn fast_hash(password: &str) -> String {
        use argon2::password_hash::{rand_core::OsRng, SaltString};
        use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};

        let params = Params::new(8, 1, 1, None).unwrap();
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        argon2
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn basic(user: &str, pass: &str) -> HeaderValue {
        let encoded = Base64::encode_string(format!("{user}:{pass}").as_bytes());
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
    }

    fn provider() -> StaticProvider {
        StaticProvider::new(&[
            UserEntry {
                username: "user".into(),
                password_hash: fast_hash("password"),
                roles: vec!["USER".into()],
            },
            UserEntry {
                username: "nobody".into(),
                password_hash: fast_hash("password"),
                roles: vec![],
            },
        ])
    }

    #[test]
    fn test_parse_basic_header() {
        let creds = Credentials::from_basic_header(&basic("alice", "s3:cret")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3:cret");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let h = HeaderValue::from_static("Bearer abc");
        assert!(matches!(
            Credentials::from_basic_header(&h),
            Err(AuthnError::MalformedCredentials(_))
        ));
        let h = HeaderValue::from_static("Basic !!!notbase64");
        assert!(Credentials::from_basic_header(&h).is_err());
        // "bm9jb2xvbg==" is "nocolon"
        let h = HeaderValue::from_static("Basic bm9jb2xvbg==");
        assert!(Credentials::from_basic_header(&h).is_err());
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        // "YWxpY2U6cHc=" is "alice:pw"
        for header in ["basic YWxpY2U6cHc=", "BASIC YWxpY2U6cHc=", "bAsIc YWxpY2U6cHc="] {
            let creds = Credentials::from_basic_header(&HeaderValue::from_static(header)).unwrap();
            assert_eq!(creds.username, "alice");
            assert_eq!(creds.password, "pw");
        }
        let h = HeaderValue::from_static("Basicx YWxpY2U6cHc=");
        assert!(Credentials::from_basic_header(&h).is_err());
    }

    #[tokio::test]
    async fn test_unknown_user_is_checked_against_a_decoy_hash() {
        let provider = provider();
        assert!(provider.decoy_hash.is_some());
        let creds = Credentials {
            username: "ghost".into(),
            password: "password".into(),
        };
        // The decoy belongs to a real account; matching it still fails
        assert!(matches!(
            provider.verify(&creds).await,
            Err(AuthnError::UnknownUser)
        ));

        let empty = StaticProvider::new(&[]);
        assert!(empty.decoy_hash.is_none());
        assert!(matches!(
            empty.verify(&creds).await,
            Err(AuthnError::UnknownUser)
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::from_basic_header(&basic("alice", "hunter2")).unwrap();
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_resolve_valid_credentials() {
        let resolver = Resolver::new(Arc::new(provider()), RoleHierarchy::default());
        let auth = resolver.resolve(Some(&basic("user", "password"))).await;
        let principal = auth.principal().expect("authenticated");
        assert_eq!(principal.id(), "user");
        assert!(principal.has_role("USER"));
    }

    #[tokio::test]
    async fn test_resolve_failures_are_unauthenticated() {
        let resolver = Resolver::new(Arc::new(provider()), RoleHierarchy::default());
        assert!(!resolver.resolve(None).await.is_authenticated());
        assert!(!resolver
            .resolve(Some(&basic("user", "wrong")))
            .await
            .is_authenticated());
        assert!(!resolver
            .resolve(Some(&basic("ghost", "password")))
            .await
            .is_authenticated());
        assert!(!resolver
            .resolve(Some(&HeaderValue::from_static("Basic ???")))
            .await
            .is_authenticated());
        // A user without roles never becomes an empty-role principal
        assert!(!resolver
            .resolve(Some(&basic("nobody", "password")))
            .await
            .is_authenticated());
    }

    #[tokio::test]
    async fn test_resolve_applies_role_hierarchy() {
        let mut includes = HashMap::new();
        includes.insert("USER".to_string(), vec!["READER".to_string()]);
        let resolver = Resolver::new(Arc::new(provider()), RoleHierarchy::new(includes));
        let auth = resolver.resolve(Some(&basic("user", "password"))).await;
        assert!(auth.principal().unwrap().has_role("READER"));
    }

    #[test]
    fn test_hash_password_roundtrip() {
        let hash = hash_password("password123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("nope", &hash).unwrap());
    }
}
