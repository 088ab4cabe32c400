//! `stockline-auth`: server-side authorization boundary.
//!
//! One role enum, one action enum and one policy table decide every mutating
//! call. This crate is decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Policy, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Action;
pub use principal::{Actor, PrincipalId};
pub use roles::Role;
