//! Ticket Common - shared types for the ticket desk daemon and CLI.
//!
//! Categories and their staff grants, the persisted ticket configuration,
//! capability resolution, ticket records, errors and the IPC protocol.

pub mod category;
pub mod config_store;
pub mod error;
pub mod ipc;
pub mod permissions;
pub mod ticket;

/// Platform identity of a channel (or channel container)
pub type ChannelId = String;

/// Platform identity of a role
pub type RoleId = String;

/// Platform identity of a user
pub type UserId = String;

/// Platform identity of a message
pub type MessageId = String;

pub use category::{Capability, CapabilityScope, Category, CategoryPatch, StaffRoles};
pub use config_store::{ChannelConfig, ConfigStore, LegacyPermissions, LegacyRoleKind, Settings, TicketConfig};
pub use error::{ArchiveError, ConfigError, ErrorClass, TicketError, TicketResult, TransportError};
pub use permissions::PermissionResolver;
pub use ticket::{Actor, Closure, TicketRecord, TicketView};
