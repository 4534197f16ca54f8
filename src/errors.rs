use miette::Diagnostic;
use thiserror::Error;

use crate::authz::errors::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(warden::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] AuthzError),

    #[error("Bad listen address `{0}`")]
    #[diagnostic(
        code(warden::listen_addr),
        help("Check `server.host` and `server.port` in the configuration")
    )]
    ListenAddr(String),
}
