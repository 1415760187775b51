//! In-memory wake-up plumbing for long-polling clients.

pub mod waiters;

pub use waiters::{WaitRegistry, Waiter};
