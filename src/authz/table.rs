use axum::http::Method;

use crate::authz::types::{OperationKind, PolicyRule, Scope};

/// Flat, ordered, read-only sequence of policy rules.
///
/// Built once at startup and shared behind an `Arc`; lookups take `&self`
/// only, so concurrent readers need no locking.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn method_rule_count(&self) -> usize {
        self.rules
            .iter()
            .filter(|r| matches!(r.scope, Scope::Method { .. }))
            .count()
    }

    pub fn route_rule_count(&self) -> usize {
        self.rules.len() - self.method_rule_count()
    }

    /// All method rules that apply to `operation` on `resource_type`.
    ///
    /// Per-operation overrides come first, then the type-wide defaults. Within
    /// each group declaration order is kept.
    pub fn rules_for_method(
        &self,
        resource_type: &str,
        operation: OperationKind,
    ) -> Vec<&PolicyRule> {
        let mut specific = Vec::new();
        let mut blanket = Vec::new();
        for rule in &self.rules {
            let Scope::Method {
                resource_type: rt,
                operation: op,
            } = &rule.scope
            else {
                continue;
            };
            if rt != resource_type {
                continue;
            }
            match op {
                Some(op) if *op == operation => specific.push(rule),
                Some(_) => {}
                None => blanket.push(rule),
            }
        }
        specific.extend(blanket);
        specific
    }

    /// Route rules for the most specific pattern matching `path`.
    ///
    /// The pattern with the longest literal prefix wins (an exact pattern beats
    /// a wildcard of the same length); every rule declared with a pattern of
    /// that rank and a compatible method is returned in declaration order.
    /// `path` must already be normalized. A `GET` rule also covers `HEAD`, which
    /// the router answers with the GET handler.
    pub fn rules_for_route(&self, method: &Method, path: &str) -> Vec<&PolicyRule> {
        let candidates: Vec<(&PolicyRule, (usize, bool))> = self
            .rules
            .iter()
            .filter_map(|rule| match &rule.scope {
                Scope::Route {
                    method: m,
                    pattern,
                } if m.as_ref().map(|m| covers(m, method)).unwrap_or(true)
                    && pattern.matches(path) =>
                {
                    Some((rule, pattern.specificity()))
                }
                _ => None,
            })
            .collect();

        let Some(best) = candidates.iter().map(|(_, s)| *s).max() else {
            return Vec::new();
        };

        candidates
            .into_iter()
            .filter(|(_, s)| *s == best)
            .map(|(rule, _)| rule)
            .collect()
    }
}

fn covers(rule_method: &Method, request_method: &Method) -> bool {
    rule_method == request_method
        || (*rule_method == Method::GET && *request_method == Method::HEAD)
}
