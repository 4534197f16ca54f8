pub mod engine;
pub mod errors;
pub mod loader;
pub mod policy;
pub mod table;
pub mod types;
pub mod web;

use crate::principal::RoleHierarchy;
use table::PolicyTable;

/// Fully compiled authorization state, loaded from KDL policy files.
/// Immutable after construction; configuration changes require a restart.
#[derive(Debug, Default)]
pub struct AuthzState {
    /// Route and method rules in declaration order
    pub table: PolicyTable,
    /// Optional role expansion, applied by the resolver before any check
    pub roles: RoleHierarchy,
}
