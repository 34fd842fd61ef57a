//! Rolescope - report Azure role assignments for a subscription.
//!
//! Resolves a subscription through the management plane, joins its role
//! assignments against the role definitions in scope, and resolves each
//! assigned principal's display name and mail through the directory graph.

pub mod arm;
pub mod credentials;
pub mod error;
pub mod graph;
pub mod output;
pub mod reporter;

pub use error::{Error, Result};
