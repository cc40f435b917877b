//! Push channel plumbing.
//!
//! The upstream server streams frames into the [`Hub`] over `/ws/feed`; the
//! provider and entity subscriptions listen on hub topics, and UI clients
//! receive [`UiEvent`]s over `/ws/events`.

mod hub;
mod protocol;

pub use hub::{Hub, Subscription};
pub use protocol::*;
