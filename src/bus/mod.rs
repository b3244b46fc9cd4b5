//! In-memory fan-out and long-poll primitives layered over the durable
//! log (spec §4.3, §4.4). Nothing here is durable; a restart drops all
//! subscribers and waiters, which is fine because every event they'd
//! miss is still recoverable from the store via `after_seq`.

pub mod events;
pub mod wait;

pub use events::EventBus;
pub use wait::WaitCoordinator;
