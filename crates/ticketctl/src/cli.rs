//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap and turns a parsed command into
//! the `Request` sent to ticketd.

use clap::{Args, Parser, Subcommand};
use ticket_common::ipc::{ChannelTarget, Request, SettingKey};
use ticket_common::{Actor, CapabilityScope, CategoryPatch, LegacyRoleKind};

/// Ticket desk control client
#[derive(Parser, Debug)]
#[command(name = "ticketctl")]
#[command(about = "Open, claim and close support tickets; administer the ticket desk", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to daemon socket (overrides $TICKETD_SOCKET and the default)
    #[arg(long, global = true)]
    pub socket: Option<String>,

    /// Print the raw JSON response
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub actor: ActorArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who the request is made on behalf of
#[derive(Args, Debug, Clone, Default)]
pub struct ActorArgs {
    /// User id of the actor
    #[arg(long = "as", global = true, default_value = "0")]
    pub id: String,

    /// Display name (ticket channels are named after it)
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Tag shown in topics and transcripts
    #[arg(long, global = true)]
    pub tag: Option<String>,

    /// Role held by the actor (repeatable)
    #[arg(long = "role", global = true)]
    pub roles: Vec<String>,

    /// Act with administrator rights
    #[arg(long, global = true)]
    pub admin: bool,
}

impl ActorArgs {
    pub fn to_actor(&self) -> Actor {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let mut actor = Actor::new(self.id.clone(), name).with_roles(self.roles.iter().cloned());
        if let Some(tag) = &self.tag {
            actor = actor.with_tag(tag.clone());
        }
        if self.admin {
            actor = actor.admin();
        }
        actor
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the daemon is up
    Ping,

    /// Open a ticket in a category
    Open {
        category: String,

        /// Select from the panel message in CHANNEL:MESSAGE
        #[arg(long, value_parser = parse_panel_ref)]
        panel: Option<(String, String)>,
    },

    /// Claim a ticket
    Claim { channel: String },

    /// Release a ticket you claimed
    Unclaim { channel: String },

    /// Press the claim button: unclaim if you hold the claim, claim otherwise
    Toggle { channel: String },

    /// Close a ticket and archive its transcript
    Close {
        channel: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// List open tickets
    Tickets,

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Manage ticket categories
    Category {
        #[command(subcommand)]
        action: CategoryCommands,
    },

    /// Grant or revoke per-category staff roles
    StaffRole {
        #[command(subcommand)]
        action: StaffRoleCommands,
    },

    /// Manage the global legacy role lists
    LegacyRole {
        #[command(subcommand)]
        action: LegacyRoleCommands,
    },

    /// Assign the storage, transcript or panel channel
    Channel {
        /// ticket_category, transcript or panel
        target: ChannelTarget,
        channel: String,
    },

    /// Change a desk setting
    Setting {
        /// ticket_prefix or max_tickets_per_user
        setting: SettingKey,
        value: String,
    },

    /// Repost the category selection panel
    RefreshPanel,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommands {
    Add {
        name: String,
        description: String,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        emoji: Option<String>,
    },
    Remove {
        name: String,
    },
    Edit {
        name: String,

        #[arg(long = "new-name")]
        new_name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        emoji: Option<String>,
    },
    List,
    Info {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum StaffRoleCommands {
    Grant {
        category: String,
        role: String,

        /// access, claim, close, persistent, ping or all
        #[arg(long, default_value = "all")]
        scope: CapabilityScope,
    },
    Revoke {
        category: String,
        role: String,

        #[arg(long, default_value = "all")]
        scope: CapabilityScope,
    },
}

#[derive(Subcommand, Debug)]
pub enum LegacyRoleCommands {
    Add {
        /// ticket_access, claim or close
        kind: LegacyRoleKind,
        role: String,
    },
    Remove {
        kind: LegacyRoleKind,
        role: String,
    },
}

fn parse_panel_ref(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((channel, message)) if !channel.is_empty() && !message.is_empty() => {
            Ok((channel.to_string(), message.to_string()))
        }
        _ => Err(format!("expected CHANNEL:MESSAGE, got {}", s)),
    }
}

impl Cli {
    /// Build the daemon request for this invocation
    pub fn to_request(&self) -> Request {
        let actor = self.actor.to_actor();
        match &self.command {
            Commands::Ping => Request::Ping,
            Commands::Open { category, panel } => match panel {
                Some((panel_channel, panel_message)) => Request::SelectCategory {
                    actor,
                    category: category.clone(),
                    panel_channel: panel_channel.clone(),
                    panel_message: panel_message.clone(),
                },
                None => Request::Create {
                    actor,
                    category: category.clone(),
                },
            },
            Commands::Claim { channel } => Request::Claim {
                actor,
                channel_id: channel.clone(),
            },
            Commands::Unclaim { channel } => Request::Unclaim {
                actor,
                channel_id: channel.clone(),
            },
            Commands::Toggle { channel } => Request::ToggleClaim {
                actor,
                channel_id: channel.clone(),
            },
            Commands::Close { channel, reason } => Request::Close {
                actor,
                channel_id: channel.clone(),
                reason: reason.clone(),
            },
            Commands::Tickets => Request::Tickets,
            Commands::Admin { action } => admin_request(actor, action),
        }
    }
}

fn admin_request(actor: Actor, action: &AdminCommands) -> Request {
    match action {
        AdminCommands::Category { action } => match action {
            CategoryCommands::Add {
                name,
                description,
                color,
                emoji,
            } => Request::CategoryAdd {
                actor,
                name: name.clone(),
                description: description.clone(),
                color: color.clone(),
                emoji: emoji.clone(),
            },
            CategoryCommands::Remove { name } => Request::CategoryRemove {
                actor,
                name: name.clone(),
            },
            CategoryCommands::Edit {
                name,
                new_name,
                description,
                color,
                emoji,
            } => Request::CategoryEdit {
                actor,
                name: name.clone(),
                patch: CategoryPatch {
                    name: new_name.clone(),
                    description: description.clone(),
                    color: color.clone(),
                    emoji: emoji.clone(),
                    staff_roles: None,
                },
            },
            CategoryCommands::List => Request::CategoryList { actor },
            CategoryCommands::Info { name } => Request::CategoryInfo {
                actor,
                name: name.clone(),
            },
        },
        AdminCommands::StaffRole { action } => match action {
            StaffRoleCommands::Grant { category, role, scope } => Request::StaffRoleGrant {
                actor,
                category: category.clone(),
                role: role.clone(),
                scope: *scope,
            },
            StaffRoleCommands::Revoke { category, role, scope } => Request::StaffRoleRevoke {
                actor,
                category: category.clone(),
                role: role.clone(),
                scope: *scope,
            },
        },
        AdminCommands::LegacyRole { action } => match action {
            LegacyRoleCommands::Add { kind, role } => Request::LegacyRoleGrant {
                actor,
                kind: *kind,
                role: role.clone(),
            },
            LegacyRoleCommands::Remove { kind, role } => Request::LegacyRoleRevoke {
                actor,
                kind: *kind,
                role: role.clone(),
            },
        },
        AdminCommands::Channel { target, channel } => Request::ChannelSet {
            actor,
            target: *target,
            channel_id: channel.clone(),
        },
        AdminCommands::Setting { setting, value } => Request::SettingSet {
            actor,
            setting: *setting,
            value: value.clone(),
        },
        AdminCommands::RefreshPanel => Request::RefreshPanel { actor },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticket_common::Capability;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ticketctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_open_builds_create() {
        let cli = parse(&["--as", "42", "--name", "una", "open", "Billing"]);
        match cli.to_request() {
            Request::Create { actor, category } => {
                assert_eq!(actor.id, "42");
                assert_eq!(actor.name, "una");
                assert!(!actor.is_admin);
                assert_eq!(category, "Billing");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_open_from_panel() {
        let cli = parse(&["open", "Billing", "--panel", "55:66"]);
        match cli.to_request() {
            Request::SelectCategory {
                panel_channel,
                panel_message,
                ..
            } => {
                assert_eq!(panel_channel, "55");
                assert_eq!(panel_message, "66");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["ticketctl", "open", "Billing", "--panel", "55"]).is_err());
    }

    #[test]
    fn test_roles_and_admin_flags() {
        let cli = parse(&["close", "1001", "--role", "staff", "--role", "closer", "--admin", "--reason", "done"]);
        match cli.to_request() {
            Request::Close { actor, channel_id, reason } => {
                assert_eq!(actor.roles, vec!["staff", "closer"]);
                assert!(actor.is_admin);
                assert_eq!(channel_id, "1001");
                assert_eq!(reason.as_deref(), Some("done"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_staff_role_scope() {
        let cli = parse(&["--admin", "admin", "staff-role", "grant", "Billing", "r1", "--scope", "claim"]);
        match cli.to_request() {
            Request::StaffRoleGrant { scope, role, .. } => {
                assert_eq!(scope, CapabilityScope::One(Capability::Claim));
                assert_eq!(role, "r1");
            }
            other => panic!("unexpected {:?}", other),
        }

        let cli = parse(&["admin", "staff-role", "revoke", "Billing", "r1"]);
        assert!(matches!(
            cli.to_request(),
            Request::StaffRoleRevoke {
                scope: CapabilityScope::All,
                ..
            }
        ));
    }

    #[test]
    fn test_admin_channel_and_setting() {
        let cli = parse(&["admin", "channel", "transcript", "900"]);
        assert!(matches!(
            cli.to_request(),
            Request::ChannelSet {
                target: ChannelTarget::Transcript,
                ..
            }
        ));

        let cli = parse(&["admin", "setting", "max_tickets_per_user", "5"]);
        match cli.to_request() {
            Request::SettingSet { setting, value, .. } => {
                assert_eq!(setting, SettingKey::MaxTicketsPerUser);
                assert_eq!(value, "5");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(Cli::try_parse_from(["ticketctl", "admin", "channel", "lobby", "900"]).is_err());
    }

    #[test]
    fn test_category_edit_patch() {
        let cli = parse(&["admin", "category", "edit", "Billing", "--new-name", "Payments"]);
        match cli.to_request() {
            Request::CategoryEdit { name, patch, .. } => {
                assert_eq!(name, "Billing");
                assert_eq!(patch.name.as_deref(), Some("Payments"));
                assert!(patch.description.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
