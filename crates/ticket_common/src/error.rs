//! Error types for the ticket desk.
//!
//! Every failure the engine can surface maps onto one of five classes so
//! callers can decide whether to show it, log it, or both.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Capability;

/// Failure class, used to decide presentation and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Missing or invalid input, shown verbatim to the actor
    Validation,
    /// Actor lacks the capability; not a system fault
    Authorization,
    /// Current state conflicts with the request
    Conflict,
    /// An external collaborator failed
    Dependency,
    /// Stored configuration no longer matches the platform
    ConfigurationDrift,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Authorization => write!(f, "authorization"),
            Self::Conflict => write!(f, "conflict"),
            Self::Dependency => write!(f, "dependency"),
            Self::ConfigurationDrift => write!(f, "configuration-drift"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TicketError {
    #[error("Category \"{0}\" not found.")]
    CategoryNotFound(String),

    #[error("You already have {open} open tickets (limit {max}). Please close some before creating a new one.")]
    TicketLimitReached { open: usize, max: u32 },

    #[error("Ticket storage is not configured. Please ask an administrator to set the ticket category first.")]
    StorageNotConfigured,

    #[error("Configured ticket storage {container} was not found. Please ask an administrator to check the configuration.")]
    StorageUnavailable { container: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("You do not have permission to {capability} tickets.")]
    Forbidden { capability: Capability },

    #[error("You need Administrator permission for this action.")]
    AdminRequired,

    #[error("This is not a valid ticket channel.")]
    NotATicket,

    #[error("Channel {0} is already registered as a ticket.")]
    DuplicateTicket(String),

    #[error("You have already claimed this ticket.")]
    AlreadyClaimedBySelf,

    #[error("This ticket is already claimed by <@{claimant}>.")]
    AlreadyClaimedByOther { claimant: String },

    #[error("You have not claimed this ticket.")]
    NotClaimedBySelf,

    #[error("No ticket categories configured. Please set up categories first.")]
    NoCategories,

    #[error("Panel {0}")]
    PanelMissing(String),

    #[error("This panel is outdated. Please ask an administrator to update the ticket panel.")]
    PanelOutdated,

    #[error("Platform error: {0}")]
    Dependency(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TicketError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TicketError::CategoryNotFound(_)
            | TicketError::TicketLimitReached { .. }
            | TicketError::StorageNotConfigured
            | TicketError::InvalidInput(_)
            | TicketError::NoCategories => ErrorClass::Validation,
            TicketError::Forbidden { .. } | TicketError::AdminRequired => {
                ErrorClass::Authorization
            }
            TicketError::NotATicket => ErrorClass::Validation,
            TicketError::DuplicateTicket(_)
            | TicketError::AlreadyClaimedBySelf
            | TicketError::AlreadyClaimedByOther { .. }
            | TicketError::NotClaimedBySelf => ErrorClass::Conflict,
            TicketError::StorageUnavailable { .. }
            | TicketError::PanelMissing(_)
            | TicketError::PanelOutdated => ErrorClass::ConfigurationDrift,
            TicketError::Dependency(_) | TicketError::Config(_) => ErrorClass::Dependency,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            TicketError::CategoryNotFound(_) => -32010,
            TicketError::TicketLimitReached { .. } => -32011,
            TicketError::StorageNotConfigured => -32012,
            TicketError::StorageUnavailable { .. } => -32013,
            TicketError::InvalidInput(_) => -32602,
            TicketError::Forbidden { .. } => -32020,
            TicketError::AdminRequired => -32021,
            TicketError::NotATicket => -32030,
            TicketError::DuplicateTicket(_) => -32031,
            TicketError::AlreadyClaimedBySelf => -32032,
            TicketError::AlreadyClaimedByOther { .. } => -32033,
            TicketError::NotClaimedBySelf => -32034,
            TicketError::NoCategories => -32040,
            TicketError::PanelMissing(_) => -32041,
            TicketError::PanelOutdated => -32042,
            TicketError::Dependency(_) => -32050,
            TicketError::Config(_) => -32051,
        }
    }
}

/// Failures reported by the chat-platform transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the persisted ticket configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the transcript exporter
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),
}

pub type TicketResult<T> = Result<T, TicketError>;
