use axum::http::Method;

use crate::principal::Principal;

/// Data-access operation kinds guarded by the method layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl OperationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "list" => Some(Self::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path pattern: literal segments with an optional trailing `**`.
///
/// `/employees/**` matches `/employees` itself and anything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatcher {
    pattern: String,
    segments: Vec<String>,
    wildcard: bool,
}

impl RouteMatcher {
    pub fn parse(pattern: &str) -> Option<Self> {
        if !pattern.starts_with('/') {
            return None;
        }
        let mut segments: Vec<String> = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let wildcard = segments.last().map(|s| s == "**").unwrap_or(false);
        if wildcard {
            segments.pop();
        }
        // Only a single trailing wildcard segment is supported.
        if segments.iter().any(|s| s.contains('*')) {
            return None;
        }
        Some(Self {
            pattern: pattern.to_string(),
            segments,
            wildcard,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// `path` is expected to be normalized already.
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() < self.segments.len() {
            return false;
        }
        if !self.wildcard && parts.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(parts.iter())
            .all(|(lit, part)| lit == part)
    }

    /// Longer literal prefixes rank higher; at equal length an exact pattern
    /// outranks a wildcard one.
    pub fn specificity(&self) -> (usize, bool) {
        (self.segments.len(), !self.wildcard)
    }
}

impl std::fmt::Display for RouteMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Collapse repeated slashes, drop `.` segments, resolve `..` without
/// escaping the root and strip any trailing slash.
pub fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// `operation: None` is the type-wide default for every operation on the
    /// resource type.
    Method {
        resource_type: String,
        operation: Option<OperationKind>,
    },
    /// `method: None` matches every HTTP method.
    Route {
        method: Option<Method>,
        pattern: RouteMatcher,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Require,
}

/// One immutable row of the policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub scope: Scope,
    pub required_role: String,
    pub effect: Effect,
}

impl PolicyRule {
    pub fn method(
        resource_type: impl Into<String>,
        operation: Option<OperationKind>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            scope: Scope::Method {
                resource_type: resource_type.into(),
                operation,
            },
            required_role: role.into(),
            effect: Effect::Require,
        }
    }

    pub fn route(method: Option<Method>, pattern: RouteMatcher, role: impl Into<String>) -> Self {
        Self {
            scope: Scope::Route { method, pattern },
            required_role: role.into(),
            effect: Effect::Require,
        }
    }
}

impl std::fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            Scope::Method {
                resource_type,
                operation: Some(op),
            } => write!(f, "{resource_type}:{op}")?,
            Scope::Method {
                resource_type,
                operation: None,
            } => write!(f, "{resource_type}:*")?,
            Scope::Route {
                method: Some(m),
                pattern,
            } => write!(f, "{m} {pattern}")?,
            Scope::Route {
                method: None,
                pattern,
            } => write!(f, "* {pattern}")?,
        }
        write!(f, " requires {}", self.required_role)
    }
}

/// Role include declaration, e.g. `role "ADMIN" { includes { - "OPERATOR" } }`.
#[derive(Debug, Clone)]
pub struct RoleDef {
    pub name: String,
    pub includes: Vec<String>,
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub rules: Vec<PolicyRule>,
    pub roles: Vec<RoleDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Deny,
    Unauthenticated,
}

/// What a request is attempting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Method {
        resource_type: String,
        kind: OperationKind,
        target_id: Option<i64>,
    },
    Route {
        method: Method,
        path: String,
    },
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Method {
                resource_type,
                kind,
                target_id: Some(id),
            } => write!(f, "{resource_type}:{kind}/{id}"),
            Operation::Method {
                resource_type,
                kind,
                target_id: None,
            } => write!(f, "{resource_type}:{kind}"),
            Operation::Route { method, path } => write!(f, "{method} {path}"),
        }
    }
}

/// Per-request input to the decision engine. Never shared across requests.
#[derive(Debug, Clone)]
pub struct AuthorizationContext<'a> {
    pub principal: Option<&'a Principal>,
    pub operation: Operation,
}

impl<'a> AuthorizationContext<'a> {
    pub fn new(principal: Option<&'a Principal>, operation: Operation) -> Self {
        Self {
            principal,
            operation,
        }
    }
}
