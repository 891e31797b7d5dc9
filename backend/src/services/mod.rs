//! Business logic services for the parts fulfillment workflow

pub mod bulk;
pub mod clock;
pub mod set;
pub mod workflow;

pub use bulk::{BulkOutcome, BulkTransitionService};
pub use clock::{Clock, FixedClock, IdGenerator, RandomIds, SequentialIds, SystemClock};
pub use set::{CreatedSet, SetService};
pub use workflow::WorkflowService;
