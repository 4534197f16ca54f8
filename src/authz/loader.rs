use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::authz::errors::AuthzError;
use crate::authz::policy::parse_kdl_document;
use crate::authz::table::PolicyTable;
use crate::authz::types::*;
use crate::authz::AuthzState;
use crate::principal::RoleHierarchy;

/// Load a single `.kdl` policy file, or every `.kdl` file in a directory
/// (merged in file-name order), and compile them into an immutable `AuthzState`.
pub fn load_policies(path: &Path) -> Result<AuthzState, AuthzError> {
    let files = if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "kdl").unwrap_or(false))
            .collect();
        entries.sort();
        entries
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        return Err(AuthzError::InvalidPolicy(format!(
            "policy path `{}` does not exist",
            path.display()
        )));
    };

    let mut all_parsed = Vec::with_capacity(files.len());
    for file in &files {
        let contents =
            std::fs::read_to_string(file).map_err(|source| AuthzError::PolicyLoadError {
                path: file.display().to_string(),
                source,
            })?;
        all_parsed.push(parse_kdl_document(&contents)?);
    }

    let state = compile_policies(all_parsed)?;

    tracing::info!(
        files = files.len(),
        method_rules = state.table.method_rule_count(),
        route_rules = state.table.route_rule_count(),
        roles = state.roles.len(),
        "Loaded authorization policies"
    );

    Ok(state)
}

/// Merge parsed policies into a single `AuthzState`, preserving declaration order.
pub fn compile_policies(parsed: Vec<ParsedPolicy>) -> Result<AuthzState, AuthzError> {
    let mut rules: Vec<PolicyRule> = Vec::new();
    let mut roles: HashMap<String, Vec<String>> = HashMap::new();

    for p in parsed {
        rules.extend(p.rules);
        for role in p.roles {
            roles.entry(role.name).or_default().extend(role.includes);
        }
    }

    for rule in &rules {
        if rule.required_role.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "rule `{rule}` has an empty required role"
            )));
        }
    }

    check_role_cycles(&roles)?;

    Ok(AuthzState {
        table: PolicyTable::new(rules),
        roles: RoleHierarchy::new(roles),
    })
}

/// Check for cycles in role inheritance using DFS.
fn check_role_cycles(roles: &HashMap<String, Vec<String>>) -> Result<(), AuthzError> {
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for name in roles.keys() {
        if !visited.contains(name.as_str()) {
            dfs_cycle_check(name, roles, &mut visited, &mut in_stack)?;
        }
    }
    Ok(())
}

fn dfs_cycle_check(
    name: &str,
    roles: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    in_stack: &mut HashSet<String>,
) -> Result<(), AuthzError> {
    visited.insert(name.to_string());
    in_stack.insert(name.to_string());

    if let Some(includes) = roles.get(name) {
        for included in includes {
            if in_stack.contains(included.as_str()) {
                return Err(AuthzError::CyclicRoleInheritance(format!(
                    "{name} -> {included}"
                )));
            }
            if !visited.contains(included.as_str()) {
                dfs_cycle_check(included, roles, visited, in_stack)?;
            }
        }
    }

    in_stack.remove(name);
    Ok(())
}
