//! HTTP surface: `/employees` and `/items` collections over the in-memory
//! store, guarded by the route filter and the method interceptor.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{OriginalUri, Path, State};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;

use crate::authn::{Authentication, AuthenticationProvider, Resolver};
use crate::authz::types::OperationKind;
use crate::authz::web::{error_response, route_filter, AccessDenied, FilterState};
use crate::authz::AuthzState;
use crate::errors::AppError;
use crate::guard::{GuardError, Guarded};
use crate::settings::Settings;
use crate::storage::{MemoryRepository, StoreError};

/// One guarded collection and where its records live.
pub struct Collection {
    name: String,
    base_url: String,
    repo: Guarded<MemoryRepository>,
}

impl Collection {
    pub fn new(name: &str, base_url: &str, authz: Arc<AuthzState>) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            repo: Guarded::new(MemoryRepository::new(), name, authz),
        }
    }

    fn location(&self, id: i64) -> String {
        format!("{}/{}/{}", self.base_url, self.name, id)
    }
}

type Shared = Arc<Collection>;

pub fn router(
    settings: &Settings,
    authz: Arc<AuthzState>,
    provider: Arc<dyn AuthenticationProvider>,
) -> Router {
    let filter = FilterState {
        resolver: Resolver::new(provider, authz.roles.clone()),
        authz: authz.clone(),
    };
    let base_url = settings.public_base_url();

    let mut router = Router::new().route("/healthz", get(health));
    for name in ["employees", "items"] {
        let collection = Arc::new(Collection::new(name, &base_url, authz.clone()));
        router = router.merge(collection_router(collection));
    }

    router
        .layer(middleware::from_fn_with_state(filter, route_filter))
        .layer(TraceLayer::new_for_http())
}

fn collection_router(collection: Shared) -> Router {
    let base = format!("/{}", collection.name);
    let item = format!("/{}/{{id}}", collection.name);
    Router::new()
        .route(&base, get(list_records).post(create_record))
        .route(
            &item,
            get(read_record)
                .put(replace_record)
                .patch(patch_record)
                .delete(delete_record),
        )
        .with_state(collection)
}

pub async fn serve(
    settings: Settings,
    authz: Arc<AuthzState>,
    provider: Arc<dyn AuthenticationProvider>,
) -> Result<(), AppError> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| AppError::ListenAddr(format!("{e}")))?;

    let router = router(&settings, authz, provider);

    tracing::info!(%addr, "Public API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Map an interceptor failure onto the response contract. Store errors keep
/// their meaning; authorization failures say nothing about the record.
fn guard_failure(err: GuardError<StoreError>, path: &str) -> Response {
    match err {
        GuardError::Unauthenticated => AccessDenied::Unauthenticated {
            path: path.to_string(),
        }
        .into_response(),
        GuardError::Forbidden => AccessDenied::Forbidden {
            path: path.to_string(),
        }
        .into_response(),
        GuardError::Store(e @ StoreError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, &e.to_string(), path)
        }
        GuardError::Store(e @ StoreError::Invalid(_)) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string(), path)
        }
    }
}

/// The request could not be turned into a store call. Report that only after
/// the method layer has permitted every operation the call would perform.
fn unusable_input(
    c: &Collection,
    auth: &Authentication,
    kinds: &[OperationKind],
    target_id: Option<i64>,
    status: StatusCode,
    message: &str,
    path: &str,
) -> Response {
    for &kind in kinds {
        if let Err(e) = c.repo.authorize(auth, kind, target_id) {
            return guard_failure(e, path);
        }
    }
    error_response(status, message, path)
}

async fn list_records(
    State(c): State<Shared>,
    Extension(auth): Extension<Authentication>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    match c.repo.list(&auth).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => guard_failure(e, uri.path()),
    }
}

async fn create_record(
    State(c): State<Shared>,
    Extension(auth): Extension<Authentication>,
    OriginalUri(uri): OriginalUri,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    const KINDS: &[OperationKind] = &[OperationKind::Create];
    let body = match body {
        Ok(Json(body)) => body,
        Err(e) => {
            return unusable_input(&c, &auth, KINDS, None, e.status(), &e.body_text(), uri.path())
        }
    };

    match c.repo.create(&auth, body).await {
        Ok(record) => {
            tracing::info!(collection = %c.name, id = record.id, "record created");
            (StatusCode::CREATED, [(header::LOCATION, c.location(record.id))]).into_response()
        }
        Err(e) => guard_failure(e, uri.path()),
    }
}

async fn read_record(
    State(c): State<Shared>,
    Extension(auth): Extension<Authentication>,
    OriginalUri(uri): OriginalUri,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    const KINDS: &[OperationKind] = &[OperationKind::Read];
    let id = match id {
        Ok(Path(id)) => id,
        Err(e) => {
            return unusable_input(&c, &auth, KINDS, None, e.status(), &e.body_text(), uri.path())
        }
    };

    match c.repo.read(&auth, id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => guard_failure(e, uri.path()),
    }
}

async fn replace_record(
    State(c): State<Shared>,
    Extension(auth): Extension<Authentication>,
    OriginalUri(uri): OriginalUri,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    const KINDS: &[OperationKind] = &[OperationKind::Update];
    let (id, body) = match (id, body) {
        (Ok(Path(id)), Ok(Json(body))) => (id, body),
        (Err(e), _) => {
            return unusable_input(&c, &auth, KINDS, None, e.status(), &e.body_text(), uri.path())
        }
        (Ok(Path(id)), Err(e)) => {
            return unusable_input(
                &c,
                &auth,
                KINDS,
                Some(id),
                e.status(),
                &e.body_text(),
                uri.path(),
            )
        }
    };

    match c.repo.update(&auth, id, body).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => guard_failure(e, uri.path()),
    }
}

/// JSON merge patch over the top-level fields: `null` removes a field.
async fn patch_record(
    State(c): State<Shared>,
    Extension(auth): Extension<Authentication>,
    OriginalUri(uri): OriginalUri,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    const KINDS: &[OperationKind] = &[OperationKind::Read, OperationKind::Update];
    let (id, patch) = match (id, body) {
        (Ok(Path(id)), Ok(Json(Value::Object(patch)))) => (id, patch),
        (Err(e), _) => {
            return unusable_input(&c, &auth, KINDS, None, e.status(), &e.body_text(), uri.path())
        }
        (Ok(Path(id)), Err(e)) => {
            return unusable_input(
                &c,
                &auth,
                KINDS,
                Some(id),
                e.status(),
                &e.body_text(),
                uri.path(),
            )
        }
        (Ok(Path(id)), Ok(_)) => {
            return unusable_input(
                &c,
                &auth,
                KINDS,
                Some(id),
                StatusCode::BAD_REQUEST,
                "Patch body must be a JSON object",
                uri.path(),
            )
        }
    };

    let result = c
        .repo
        .modify(&auth, id, |current| {
            let mut fields: Map<String, Value> = current.fields;
            for (key, value) in patch {
                if value.is_null() {
                    fields.remove(&key);
                } else {
                    fields.insert(key, value);
                }
            }
            Value::Object(fields)
        })
        .await;

    match result {
        Ok(record) => Json(record).into_response(),
        Err(e) => guard_failure(e, uri.path()),
    }
}

async fn delete_record(
    State(c): State<Shared>,
    Extension(auth): Extension<Authentication>,
    OriginalUri(uri): OriginalUri,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    const KINDS: &[OperationKind] = &[OperationKind::Delete];
    let id = match id {
        Ok(Path(id)) => id,
        Err(e) => {
            return unusable_input(&c, &auth, KINDS, None, e.status(), &e.body_text(), uri.path())
        }
    };

    match c.repo.delete(&auth, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => guard_failure(e, uri.path()),
    }
}
