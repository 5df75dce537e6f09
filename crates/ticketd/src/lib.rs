//! ticketd - support ticket lifecycle daemon
//!
//! The lifecycle engine, its collaborators and the RPC surface are exposed
//! as a library so integration tests can drive them against the in-memory
//! transport.

pub mod admin;
pub mod config;
pub mod engine;
pub mod index;
pub mod locks;
pub mod memory_transport;
pub mod messages;
pub mod overwrites;
pub mod panel;
pub mod registry;
pub mod restore;
pub mod rpc;
pub mod state;
pub mod transcript;
pub mod transport;

pub use engine::TicketLifecycleEngine;
pub use state::DaemonState;
