//! Request handlers for conflict resolution, history and the push channel.

mod history;
mod resolve;
mod websocket;

pub use history::*;
pub use resolve::*;
pub use websocket::*;
