use axum::http::Method;
use kdl::KdlDocument;

use crate::authz::errors::AuthzError;
use crate::authz::types::*;

/// Parse a KDL document string into typed policy structs.
///
/// Rules keep their declaration order; the policy table relies on it for
/// tie-breaking between equally specific rules.
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "route" => {
                let args = string_args(node);
                let [method, pattern] = args.as_slice() else {
                    return Err(AuthzError::InvalidRoute(format!(
                        "route node requires a method and a path pattern, got {} argument(s)",
                        args.len()
                    )));
                };

                let method = parse_method(method)?;
                let matcher = RouteMatcher::parse(pattern).ok_or_else(|| {
                    AuthzError::InvalidRoute(format!("invalid path pattern `{pattern}`"))
                })?;
                let role = require_prop(node).ok_or_else(|| {
                    AuthzError::InvalidRoute(format!(
                        "route `{pattern}` missing non-empty `require` property (e.g. require=\"ADMIN\")"
                    ))
                })?;

                policy.rules.push(PolicyRule::route(method, matcher, role));
            }
            "resource" => {
                let resource_type = first_string_arg(node)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        AuthzError::InvalidResource(
                            "resource node requires a string argument (e.g. resource \"items\")"
                                .into(),
                        )
                    })?;

                let Some(children) = node.children() else {
                    continue;
                };
                for child in children.nodes() {
                    match child.name().value() {
                        "require" => {
                            let role =
                                first_string_arg(child).filter(|r| !r.is_empty()).ok_or_else(
                                    || {
                                        AuthzError::InvalidResource(format!(
                                            "`require` in resource `{resource_type}` needs a role name"
                                        ))
                                    },
                                )?;
                            policy
                                .rules
                                .push(PolicyRule::method(&resource_type, None, role));
                        }
                        "operation" => {
                            let op_name = first_string_arg(child).unwrap_or_default();
                            let op = OperationKind::parse(&op_name).ok_or_else(|| {
                                AuthzError::InvalidResource(format!(
                                    "unknown operation `{op_name}` in resource `{resource_type}`"
                                ))
                            })?;
                            let role = require_prop(child).ok_or_else(|| {
                                AuthzError::InvalidResource(format!(
                                    "operation `{op}` in resource `{resource_type}` missing non-empty `require` property"
                                ))
                            })?;
                            policy
                                .rules
                                .push(PolicyRule::method(&resource_type, Some(op), role));
                        }
                        other => {
                            return Err(AuthzError::InvalidResource(format!(
                                "unexpected child `{other}` in resource `{resource_type}` (expected `require` or `operation`)"
                            )));
                        }
                    }
                }
            }
            "role" => {
                let name = first_string_arg(node)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        AuthzError::InvalidPolicy(
                            "role node requires a string argument (e.g. role \"ADMIN\")".into(),
                        )
                    })?;

                let mut includes = Vec::new();
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "includes" => {
                                includes = dash_list(child);
                            }
                            other => {
                                return Err(AuthzError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in role `{name}` (expected `includes`)"
                                )));
                            }
                        }
                    }
                }
                if includes.iter().any(|r| r.is_empty()) {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "role `{name}` includes an empty role name"
                    )));
                }

                policy.roles.push(RoleDef { name, includes });
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_method(s: &str) -> Result<Option<Method>, AuthzError> {
    if s == "*" {
        return Ok(None);
    }
    if s.is_empty() || s.chars().any(|c| !c.is_ascii_uppercase()) {
        return Err(AuthzError::InvalidRoute(format!(
            "invalid HTTP method `{s}` (expected an upper-case verb or \"*\")"
        )));
    }
    Method::from_bytes(s.as_bytes())
        .map(Some)
        .map_err(|_| AuthzError::InvalidRoute(format!("invalid HTTP method `{s}`")))
}

fn require_prop(node: &kdl::KdlNode) -> Option<String> {
    node.get("require")
        .and_then(|v| v.as_string())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// All positional string arguments of a KDL node, in order.
fn string_args(node: &kdl::KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    string_args(node).into_iter().next()
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// ```kdl
/// includes {
///     - "USER"
/// }
/// ```
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
