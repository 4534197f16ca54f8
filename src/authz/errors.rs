use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(warden::authz::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(warden::authz::invalid_policy),
        help("Each policy file may contain `route`, `resource`, or `role` KDL nodes")
    )]
    InvalidPolicy(String),

    #[error("Invalid route rule: {0}")]
    #[diagnostic(
        code(warden::authz::invalid_route),
        help("Route syntax: route \"POST\" \"/employees/**\" require=\"ADMIN\" (use \"*\" for any method, a \"GET\" rule also covers HEAD; only a trailing /** wildcard is supported)")
    )]
    InvalidRoute(String),

    #[error("Invalid resource rule: {0}")]
    #[diagnostic(
        code(warden::authz::invalid_resource),
        help("Resource syntax: resource \"items\" {{ require \"USER\"; operation \"delete\" require=\"ADMIN\" }} with operations create, read, update, delete, list")
    )]
    InvalidResource(String),

    #[error("Cyclic role inheritance detected: {0}")]
    #[diagnostic(
        code(warden::authz::cyclic_roles),
        help("Check the `includes` lists in your role definitions for circular references")
    )]
    CyclicRoleInheritance(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(warden::authz::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(warden::authz::io))]
    Io(#[from] std::io::Error),
}
