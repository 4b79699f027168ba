//! [`Group`]: one provisioned cohort (a TA group).
//!
//! On the platform a group is a role plus a private text/voice channel pair,
//! all sharing the group's `name`.

use serde::{Deserialize, Serialize};

use super::ids::RoleId;

/// Prefix shared by every generated group name.
pub const GROUP_PREFIX: &str = "group_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub emoji: String,
    /// `None` until the platform role has been created.
    #[serde(default)]
    pub role_id: Option<RoleId>,
}

impl Group {
    /// Deterministic group for 1-based index `index`, not yet bound to a role.
    pub fn numbered(index: usize, emoji: impl Into<String>) -> Self {
        Self {
            name: group_name(index),
            emoji: emoji.into(),
            role_id: None,
        }
    }

    /// Whether a reaction emoji selects this group.
    pub fn matches_emoji(&self, emoji: &str) -> bool {
        normalize_emoji(&self.emoji) == normalize_emoji(emoji)
    }

    /// Label used in the tracking message summary.
    pub fn label(&self) -> String {
        format!("{} -> {}", self.emoji, self.name)
    }
}

pub fn group_name(index: usize) -> String {
    format!("{GROUP_PREFIX}{index}")
}

/// Canonical form for emoji comparison: surrounding whitespace, custom
/// emoji brackets (`<:name:id>`, `<a:name:id>`) and the emoji
/// presentation selector are dropped.
pub fn normalize_emoji(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.strip_prefix("a:").or_else(|| s.strip_prefix(':')).unwrap_or(s))
        .unwrap_or(trimmed);
    inner.chars().filter(|c| *c != '\u{fe0f}').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_groups_are_one_based() {
        let g = Group::numbered(7, "🦀");
        assert_eq!(g.name, "group_7");
        assert_eq!(g.role_id, None);
        assert_eq!(g.label(), "🦀 -> group_7");
    }

    #[test]
    fn emoji_matching_ignores_presentation_selector() {
        let g = Group::numbered(1, "⚓");
        assert!(g.matches_emoji("⚓\u{fe0f}"));
        assert!(g.matches_emoji(" ⚓ "));
        assert!(!g.matches_emoji("🍎"));
        assert_eq!(normalize_emoji("<:party:123>"), "party:123");
        assert_eq!(normalize_emoji("<a:dance:9>"), "dance:9");
    }

    #[test]
    fn missing_role_id_deserializes_as_none() {
        let g: Group = serde_json::from_str(r#"{"name":"group_1","emoji":"🍎"}"#).unwrap();
        assert_eq!(g.role_id, None);
    }
}
