//! Method-level authorization around a [`Repository`].
//!
//! Every operation is checked against the policy table before the wrapped
//! repository is touched. A denied create/update/delete therefore has no side
//! effects at all.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::authn::Authentication;
use crate::authz::engine;
use crate::authz::types::{AuthorizationContext, Decision, Operation, OperationKind};
use crate::authz::AuthzState;
use crate::storage::{Record, Repository};

#[derive(Debug, Error)]
pub enum GuardError<E> {
    #[error("Full authentication is required to access this resource")]
    Unauthenticated,

    #[error("Access is denied")]
    Forbidden,

    /// Passed through from the repository without reinterpretation.
    #[error(transparent)]
    Store(E),
}

pub struct Guarded<R> {
    inner: R,
    resource_type: String,
    authz: Arc<AuthzState>,
}

impl<R: Repository> Guarded<R> {
    pub fn new(inner: R, resource_type: impl Into<String>, authz: Arc<AuthzState>) -> Self {
        Self {
            inner,
            resource_type: resource_type.into(),
            authz,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Decide `kind` without touching the store. Callers that cannot build the
    /// store request (bad id, unreadable body) still ask this first, so the
    /// caller's input is never judged before its access is.
    pub fn authorize(
        &self,
        auth: &Authentication,
        kind: OperationKind,
        target_id: Option<i64>,
    ) -> Result<(), GuardError<R::Error>> {
        let rules = self.authz.table.rules_for_method(&self.resource_type, kind);
        let ctx = AuthorizationContext::new(
            auth.principal(),
            Operation::Method {
                resource_type: self.resource_type.clone(),
                kind,
                target_id,
            },
        );
        match engine::decide(&ctx, &rules) {
            Decision::Permit => Ok(()),
            Decision::Deny => Err(GuardError::Forbidden),
            Decision::Unauthenticated => Err(GuardError::Unauthenticated),
        }
    }

    pub async fn create(
        &self,
        auth: &Authentication,
        record: Value,
    ) -> Result<Record, GuardError<R::Error>> {
        self.authorize(auth, OperationKind::Create, None)?;
        self.inner.create(record).await.map_err(GuardError::Store)
    }

    pub async fn read(&self, auth: &Authentication, id: i64) -> Result<Record, GuardError<R::Error>> {
        self.authorize(auth, OperationKind::Read, Some(id))?;
        self.inner.read(id).await.map_err(GuardError::Store)
    }

    pub async fn update(
        &self,
        auth: &Authentication,
        id: i64,
        record: Value,
    ) -> Result<Record, GuardError<R::Error>> {
        self.authorize(auth, OperationKind::Update, Some(id))?;
        self.inner.update(id, record).await.map_err(GuardError::Store)
    }

    /// Read-modify-write. Both the read and the update are authorized before
    /// the store is touched, so a denied caller learns nothing about `id`.
    pub async fn modify<F>(
        &self,
        auth: &Authentication,
        id: i64,
        apply: F,
    ) -> Result<Record, GuardError<R::Error>>
    where
        F: FnOnce(Record) -> Value,
    {
        self.authorize(auth, OperationKind::Read, Some(id))?;
        self.authorize(auth, OperationKind::Update, Some(id))?;
        let current = self.inner.read(id).await.map_err(GuardError::Store)?;
        self.inner
            .update(id, apply(current))
            .await
            .map_err(GuardError::Store)
    }

    pub async fn delete(&self, auth: &Authentication, id: i64) -> Result<(), GuardError<R::Error>> {
        self.authorize(auth, OperationKind::Delete, Some(id))?;
        self.inner.delete(id).await.map_err(GuardError::Store)
    }

    pub async fn list(&self, auth: &Authentication) -> Result<Vec<Record>, GuardError<R::Error>> {
        self.authorize(auth, OperationKind::List, None)?;
        self.inner.list().await.map_err(GuardError::Store)
    }
}
