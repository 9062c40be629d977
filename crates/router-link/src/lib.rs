//! Router connection manager: dial a preferred endpoint, perform the
//! `startup-req-3` handshake, and run the session loop (packet dispatch,
//! idle-timeout detection, reconnect with jittered backoff, failover to
//! the next configured router after repeated failures).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  i3g-gateway                                                │
//! │                                                              │
//! │   let (outbound_tx, handle) = RouterLinkBuilder::new()      │
//! │       .router_config(cfg.router)                            │
//! │       .mud_config(cfg.mud)                                  │
//! │       .build()?                                             │
//! │       .spawn(state, events_tx, shutdown);                   │
//! │                                                              │
//! │   outbound_tx.send(packet).await?;                          │
//! │   // events_tx delivers LinkEvent::PacketReceived, etc.     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. Dial the current preferred endpoint (TCP).
//! 2. Send `startup-req-3` with the last known router password and
//!    mudlist/chanlist IDs.
//! 3. Wait for `startup-reply` (or an `error` packet) within
//!    `handshake_timeout`.
//! 4. Main loop: decode inbound frames into packets and forward them;
//!    encode and write outbound packets; disconnect after `idle_timeout`
//!    with no inbound traffic.
//! 5. On disconnect: reconnect with jittered exponential backoff. After
//!    `max_attempts` consecutive failures on the current endpoint, fail
//!    over to the next one in the preferred list.
//!
//! This crate owns the socket and the connection state machine; it has no
//! notion of mudlist/chanlist storage, service dispatch, or the API
//! plane — see `i3g-state` for persisted state and `i3g-gateway` for
//! everything built on top of a connected link.

pub mod builder;
pub mod connection;
pub mod error;
pub mod reconnect;
pub mod session;

pub use builder::RouterLinkBuilder;
pub use connection::RouterLink;
pub use error::{LinkError, Result};
pub use reconnect::ReconnectBackoff;
pub use session::{LinkEvent, LinkState};
