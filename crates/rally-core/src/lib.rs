//! Channel membership, task mutation and push fan-out for rally.
//!
//! Every component takes its collaborators and configuration at construction
//! time; nothing here reads process-global state.

pub mod aggregate;
pub mod config;
pub mod credentials;
pub mod error;
pub mod membership;
pub mod notify;
pub mod store;
pub mod tasks;
pub mod tokens;

pub use aggregate::ErrorList;
pub use error::{CoreError, CoreResult};
