use std::collections::{BTreeSet, HashMap, HashSet};

/// An authenticated actor and the flat set of roles it holds.
///
/// Built once per request by the resolver and never persisted. Two principals
/// are equal when their identifiers are equal, regardless of roles.
#[derive(Debug, Clone)]
pub struct Principal {
    id: String,
    roles: BTreeSet<String>,
}

impl Principal {
    /// Returns `None` for an empty identifier, an empty role set, or any empty
    /// role name. Unauthenticated callers have no principal at all.
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        if id.is_empty() {
            return None;
        }
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() || roles.iter().any(|r| r.is_empty()) {
            return None;
        }
        Some(Self { id, roles })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// Exact, case-sensitive membership. No wildcards, no implied roles.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns a copy whose role set includes everything implied by `hierarchy`.
    pub fn expanded(&self, hierarchy: &RoleHierarchy) -> Self {
        Self {
            id: self.id.clone(),
            roles: hierarchy.expand(&self.roles),
        }
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Principal {}

impl std::hash::Hash for Principal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

pub fn has_role(principal: &Principal, role: &str) -> bool {
    principal.has_role(role)
}

/// Optional role -> implied roles mapping, applied before any role check.
///
/// Empty by default, in which case roles stay flat and `ADMIN` does not
/// include `USER`. Acyclicity is checked by the policy loader.
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    includes: HashMap<String, Vec<String>>,
}

impl RoleHierarchy {
    pub fn new(includes: HashMap<String, Vec<String>>) -> Self {
        Self { includes }
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.includes.len()
    }

    pub fn includes(&self, role: &str) -> &[String] {
        self.includes
            .get(role)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Transitive closure of `roles` under the include relation.
    pub fn expand(&self, roles: &BTreeSet<String>) -> BTreeSet<String> {
        let mut out = roles.clone();
        if self.includes.is_empty() {
            return out;
        }
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = roles.iter().map(String::as_str).collect();
        while let Some(role) = stack.pop() {
            if !visited.insert(role) {
                continue;
            }
            for implied in self.includes(role) {
                out.insert(implied.clone());
                stack.push(implied);
            }
        }
        out
    }
}
