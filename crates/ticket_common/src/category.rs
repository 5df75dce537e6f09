//! Ticket categories and their per-capability staff role grants.

use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::RoleId;

/// Default embed colour for categories and panels
pub const DEFAULT_COLOR: &str = "#7289da";

/// Default category emoji
pub const DEFAULT_EMOJI: &str = "🎫";

/// A permission dimension a role can hold on a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// View and respond to tickets
    Access,
    /// Claim tickets
    Claim,
    /// Close tickets
    Close,
    /// Keep send access when someone else claims
    Persistent,
    /// Mentioned when a ticket is created
    Ping,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Access,
        Capability::Claim,
        Capability::Close,
        Capability::Persistent,
        Capability::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Access => "access",
            Capability::Claim => "claim",
            Capability::Close => "close",
            Capability::Persistent => "persistent",
            Capability::Ping => "ping",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" => Ok(Capability::Access),
            "claim" => Ok(Capability::Claim),
            "close" => Ok(Capability::Close),
            "persistent" => Ok(Capability::Persistent),
            "ping" => Ok(Capability::Ping),
            other => Err(format!("unknown capability: {}", other)),
        }
    }
}

/// Which capability sets a staff-role grant touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "capability")]
pub enum CapabilityScope {
    One(Capability),
    All,
}

impl CapabilityScope {
    pub fn capabilities(&self) -> Vec<Capability> {
        match self {
            CapabilityScope::One(cap) => vec![*cap],
            CapabilityScope::All => Capability::ALL.to_vec(),
        }
    }
}

impl std::fmt::Display for CapabilityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityScope::One(cap) => write!(f, "{}", cap),
            CapabilityScope::All => write!(f, "all"),
        }
    }
}

impl FromStr for CapabilityScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(CapabilityScope::All);
        }
        s.parse().map(CapabilityScope::One)
    }
}

/// Staff role grants of one category.
///
/// `ping` is optional on purpose: an explicitly empty set silences pings,
/// while an absent set (data written before pings existed) falls back to
/// every other staff role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRoles {
    #[serde(default)]
    pub access: Vec<RoleId>,
    #[serde(default)]
    pub claim: Vec<RoleId>,
    #[serde(default)]
    pub close: Vec<RoleId>,
    #[serde(default)]
    pub persistent: Vec<RoleId>,
    #[serde(
        default,
        deserialize_with = "deserialize_ping",
        skip_serializing_if = "Option::is_none"
    )]
    pub ping: Option<Vec<RoleId>>,
}

/// A present `ping` key is always an explicit set; `null` means nobody.
/// Only a missing key (handled by `default`) stays `None`.
fn deserialize_ping<'de, D>(deserializer: D) -> Result<Option<Vec<RoleId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Option::<Vec<RoleId>>::deserialize(deserializer)?.unwrap_or_default()))
}

impl StaffRoles {
    /// Fully structured, empty grants including an explicit ping set
    pub fn empty() -> Self {
        Self {
            ping: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn roles(&self, capability: Capability) -> &[RoleId] {
        match capability {
            Capability::Access => &self.access,
            Capability::Claim => &self.claim,
            Capability::Close => &self.close,
            Capability::Persistent => &self.persistent,
            Capability::Ping => self.ping.as_deref().unwrap_or(&[]),
        }
    }

    fn roles_mut(&mut self, capability: Capability) -> &mut Vec<RoleId> {
        match capability {
            Capability::Access => &mut self.access,
            Capability::Claim => &mut self.claim,
            Capability::Close => &mut self.close,
            Capability::Persistent => &mut self.persistent,
            Capability::Ping => self.ping.get_or_insert_with(Vec::new),
        }
    }

    pub fn contains(&self, capability: Capability, role: &str) -> bool {
        self.roles(capability).iter().any(|r| r == role)
    }

    /// Add a role to one set; returns false if it was already there
    pub fn grant(&mut self, capability: Capability, role: &str) -> bool {
        let set = self.roles_mut(capability);
        if set.iter().any(|r| r == role) {
            return false;
        }
        set.push(role.to_string());
        true
    }

    /// Remove a role from one set; returns false if it was not there
    pub fn revoke(&mut self, capability: Capability, role: &str) -> bool {
        let set = self.roles_mut(capability);
        let before = set.len();
        set.retain(|r| r != role);
        set.len() != before
    }

    /// Deduplicated union of several sets, in first-seen order
    pub fn union(&self, capabilities: &[Capability]) -> Vec<RoleId> {
        let mut out: Vec<RoleId> = Vec::new();
        for cap in capabilities {
            for role in self.roles(*cap) {
                if !out.contains(role) {
                    out.push(role.clone());
                }
            }
        }
        out
    }

    pub fn ping_defined(&self) -> bool {
        self.ping.is_some()
    }
}

/// On-disk shapes of `staffRoles`.
///
/// Older configuration files stored a flat list of role ids, meaning
/// "access only". The configuration store normalises this once when it
/// reads the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StaffRolesShape {
    LegacyFlat(Vec<RoleId>),
    Structured(StaffRoles),
}

impl StaffRolesShape {
    pub fn is_legacy(&self) -> bool {
        matches!(self, StaffRolesShape::LegacyFlat(_))
    }

    pub fn normalize(self) -> StaffRoles {
        match self {
            StaffRolesShape::LegacyFlat(access) => StaffRoles {
                access,
                ..StaffRoles::default()
            },
            StaffRolesShape::Structured(roles) => roles,
        }
    }
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_emoji() -> String {
    DEFAULT_EMOJI.to_string()
}

/// A named issue type with its own presentation and staff grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_emoji")]
    pub emoji: String,
    #[serde(default)]
    pub staff_roles: StaffRoles,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            color: default_color(),
            emoji: default_emoji(),
            staff_roles: StaffRoles::empty(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = emoji.into();
        self
    }

    pub fn with_staff_roles(mut self, staff_roles: StaffRoles) -> Self {
        self.staff_roles = staff_roles;
        self
    }

    /// Apply a partial update; `None` fields are left alone
    pub fn apply(&mut self, patch: CategoryPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(emoji) = patch.emoji {
            self.emoji = emoji;
        }
        if let Some(staff_roles) = patch.staff_roles {
            self.staff_roles = staff_roles;
        }
    }
}

/// Partial category update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_roles: Option<StaffRoles>,
}

impl CategoryPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.color.is_none()
            && self.emoji.is_none()
            && self.staff_roles.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_flat_shape_normalizes_to_access() {
        let shape: StaffRolesShape = serde_json::from_str(r#"["R1", "R2"]"#).unwrap();
        assert!(shape.is_legacy());

        let roles = shape.normalize();
        assert_eq!(roles.access, vec!["R1".to_string(), "R2".to_string()]);
        assert!(roles.claim.is_empty());
        assert!(roles.close.is_empty());
        assert!(roles.persistent.is_empty());
        assert!(!roles.ping_defined());
    }

    #[test]
    fn test_structured_shape_keeps_explicit_empty_ping() {
        let shape: StaffRolesShape = serde_json::from_str(
            r#"{"access":["A"],"claim":[],"close":[],"persistent":[],"ping":[]}"#,
        )
        .unwrap();
        assert!(!shape.is_legacy());

        let roles = shape.normalize();
        assert_eq!(roles.ping, Some(vec![]));
    }

    #[test]
    fn test_structured_shape_without_ping_key() {
        let shape: StaffRolesShape =
            serde_json::from_str(r#"{"access":["A"],"claim":["B"]}"#).unwrap();
        let roles = shape.normalize();
        assert_eq!(roles.ping, None);
        assert!(roles.close.is_empty());
    }

    #[test]
    fn test_grant_and_revoke_report_changes() {
        let mut roles = StaffRoles::default();
        assert!(roles.grant(Capability::Claim, "S"));
        assert!(!roles.grant(Capability::Claim, "S"));
        assert!(roles.contains(Capability::Claim, "S"));

        assert!(roles.revoke(Capability::Claim, "S"));
        assert!(!roles.revoke(Capability::Claim, "S"));
    }

    #[test]
    fn test_granting_ping_creates_the_set() {
        let mut roles = StaffRoles::default();
        assert!(!roles.ping_defined());
        roles.grant(Capability::Ping, "P");
        assert_eq!(roles.ping, Some(vec!["P".to_string()]));
    }

    #[test]
    fn test_union_dedups_in_order() {
        let roles = StaffRoles {
            access: vec!["A".into(), "B".into()],
            claim: vec!["B".into(), "C".into()],
            close: vec!["A".into()],
            persistent: vec![],
            ping: None,
        };
        assert_eq!(
            roles.union(&[Capability::Access, Capability::Claim, Capability::Close]),
            vec!["A".to_string(), "B".to_string(), "C".to_string()]
        );
    }

    #[test]
    fn test_capability_scope_parse() {
        assert_eq!("all".parse::<CapabilityScope>().unwrap(), CapabilityScope::All);
        assert_eq!(
            "Persistent".parse::<CapabilityScope>().unwrap(),
            CapabilityScope::One(Capability::Persistent)
        );
        assert!("owner".parse::<CapabilityScope>().is_err());
        assert_eq!(CapabilityScope::All.capabilities().len(), 5);
    }

    #[test]
    fn test_category_defaults_on_deserialize() {
        let cat: Category = serde_json::from_str(r#"{"name":"Billing"}"#).unwrap();
        assert_eq!(cat.color, DEFAULT_COLOR);
        assert_eq!(cat.emoji, DEFAULT_EMOJI);
        assert_eq!(cat.staff_roles, StaffRoles::default());
    }

    #[test]
    fn test_category_patch_applies_only_set_fields() {
        let mut cat = Category::new("Billing", "Payments").with_emoji("💰");
        cat.apply(CategoryPatch {
            description: Some("Invoices".into()),
            ..CategoryPatch::default()
        });
        assert_eq!(cat.description, "Invoices");
        assert_eq!(cat.emoji, "💰");
        assert_eq!(cat.name, "Billing");
    }
}
