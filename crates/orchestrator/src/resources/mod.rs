//! RAII resource guards for automatic cleanup.
//!
//! - [`CredentialLease`] - Returns a leased credential to its pool

mod credential_lease;

pub use credential_lease::CredentialLease;
