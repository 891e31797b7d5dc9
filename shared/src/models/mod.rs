//! Domain models for the parts fulfillment workflow

mod dispatch;
mod history;
mod ids;
mod multi_part;
mod request;
mod status;

pub use dispatch::*;
pub use history::*;
pub use ids::*;
pub use multi_part::*;
pub use request::*;
pub use status::*;
