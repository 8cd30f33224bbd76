//! DevTools protocol plumbing.
//!
//! - [`session`] - command correlation and event fan-out, transport-agnostic
//! - [`transport`] - websocket binding for a live browser tab
//! - [`events`] - typed payloads for the events the generator observes

pub mod events;
mod session;
mod transport;

pub use session::{next_event, CdpEvent, CdpResponseError, CdpSession, EVENT_BUFFER};
pub use transport::connect_websocket;
