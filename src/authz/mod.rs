//! Access control for CA administrators.
//!
//! Groups of admin entities carry path rules. A compiled [`tree::AccessTree`] answers
//! decisions; [`cache::TreeCache`] rebuilds it when the shared version counter moves.

pub mod audit;
pub mod bootstrap;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod errors;
pub mod loader;
pub mod matcher;
pub mod policy;
pub mod service;
pub mod store;
pub mod tree;
pub mod trust;
pub mod types;

pub use errors::{AuthzError, StoreError};
pub use matcher::{AdminIdentity, CertificateIdentity};
pub use service::{AuthorizationService, AuthzOptions, Collaborators};
