//! Chat service operations: sessions, conversations, messages and the
//! long-poll event feed, plus the positional RPC surface that exposes them.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod events;
pub mod messages;
pub mod password;
pub mod responder;
pub mod rpc;
pub mod session;
pub mod state;
pub mod users;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner, ServiceSettings};

#[cfg(test)]
pub(crate) mod testing;
