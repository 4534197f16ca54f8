use std::path::Path;
use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use base64ct::{Base64, Encoding};
use serde_json::Value;
use tower::ServiceExt;
use warden::authn::StaticProvider;
use warden::authz::loader::load_policies;
use warden::settings::{Settings, UserEntry};

pub const BASE_URL: &str = "http://api.test";

/// Cheap argon2 parameters; the verifier reads them back from the hash.
fn fast_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).expect("valid params");
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .expect("hash")
        .to_string()
}

fn user(name: &str, roles: &[&str]) -> UserEntry {
    UserEntry {
        username: name.to_string(),
        password_hash: fast_hash("password"),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

/// The full router over the reference policy and three accounts:
/// `user` {USER}, `admin` {USER, ADMIN}, `root` {ADMIN}.
pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let policies = Path::new(env!("CARGO_MANIFEST_DIR")).join("policies");
        Self::with_policy_path(&policies)
    }

    pub fn with_policy_path(path: &Path) -> Self {
        let authz = Arc::new(load_policies(path).expect("policies load"));

        let mut settings = Settings::default();
        settings.server.public_base_url = Some(BASE_URL.to_string());
        settings.users = vec![
            user("user", &["USER"]),
            user("admin", &["USER", "ADMIN"]),
            user("root", &["ADMIN"]),
        ];

        let provider = Arc::new(StaticProvider::new(&settings.users));
        Self {
            router: warden::web::router(&settings, authz, provider),
        }
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        credentials: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Option<Value>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((u, p)) = credentials {
            builder = builder.header("authorization", basic(u, p));
        }
        let request = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        send(self.router.clone(), request).await
    }

    /// Like [`TestApp::call`] but with the body sent verbatim.
    pub async fn call_raw(
        &self,
        method: &str,
        uri: &str,
        credentials: Option<(&str, &str)>,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, HeaderMap, Option<Value>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((u, p)) = credentials {
            builder = builder.header("authorization", basic(u, p));
        }
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request");
        send(self.router.clone(), request).await
    }
}

pub fn basic(user: &str, password: &str) -> String {
    format!(
        "Basic {}",
        Base64::encode_string(format!("{user}:{password}").as_bytes())
    )
}

pub async fn send(
    router: Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, Option<Value>) {
    let response = router.oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };
    (status, headers, body)
}
