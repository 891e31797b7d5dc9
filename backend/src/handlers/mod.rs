//! HTTP handlers

pub mod bulk;
pub mod health;
pub mod requests;
pub mod sets;

pub use bulk::{commit_bulk, preview_bulk};
pub use health::health_check;
pub use requests::{create_request, get_history, get_request, list_requests, transition_request};
pub use sets::{create_batch, create_set, get_set_progress};
