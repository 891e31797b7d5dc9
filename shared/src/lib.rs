//! Shared domain for the parts fulfillment workflow
//!
//! Pure types and rules used by the backend and, via WASM, by the browser:
//! the request state machine, the branch dispatch ledger, bulk planning and
//! set progress. Nothing in this crate performs I/O.

pub mod bulk;
pub mod error;
pub mod models;
pub mod types;
pub mod validation;
pub mod workflow;

pub use bulk::*;
pub use error::*;
pub use models::*;
pub use types::*;
pub use workflow::*;
