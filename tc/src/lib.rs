//! TaskCoord - event-driven task coordination engine
//!
//! TaskCoord is the pub/sub core behind Guidepost. Components register
//! subscribers against bitflag event masks; tool handlers and the timer loop
//! inject events; the coordinator fans each event out to every matching live
//! subscriber. Subscribers are held by weak reference, so their lifetime is
//! owned entirely by the surrounding server.
//!
//! # Core Concepts
//!
//! - **Bitflag routing**: a subscription mask matches any event it intersects
//! - **Weak subscribers**: dead subscribers are pruned, never kept alive
//! - **Cooperative dispatch**: one dispatch pass at a time, in registration order
//! - **Instruction piggybacking**: subscribers queue text that rides out on
//!   the next protocol response, whatever tool triggered it
//!
//! # Modules
//!
//! - [`event`] - the `EventType` bitflag vocabulary
//! - [`subscriber`] - the single-method `Subscriber` contract
//! - [`registry`] - subscription storage and timer schedule
//! - [`coordinator`] - dispatch, instruction queue, lifecycle
//! - [`timer`] - the recurring/one-shot timer loop

pub mod coordinator;
pub mod error;
pub mod event;
pub mod registry;
pub mod subscriber;
pub mod timer;

pub use coordinator::TaskCoordinator;
pub use error::CoordError;
pub use event::EventType;
pub use registry::{SubscriptionId, TimerConfig};
pub use subscriber::Subscriber;
