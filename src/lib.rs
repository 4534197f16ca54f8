//! Warden - layered route and method authorization
//!
//! A request passes the route filter ([`authz::web::route_filter`]) and then,
//! for guarded data access, the method interceptor ([`guard::Guarded`]). Both
//! layers ask the same decision engine ([`authz::engine`]) against the same
//! policy table, so precedence rules are identical on both sides.

pub mod authn;
pub mod authz;
pub mod errors;
pub mod guard;
pub mod principal;
pub mod settings;
pub mod storage;
pub mod web;
