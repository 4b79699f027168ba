//! [`Guild`]: the per-server aggregate persisted by the store.
//!
//! One document per guild.  The store replaces the whole document on every
//! write; see [`crate::store::GuildRepository`] for the read-modify-write
//! helpers that mutate it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::group::Group;
use super::ids::{GuildId, MessageId};

/// An external Canvas LMS course tracked by a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasCourse {
    pub name: String,
    pub id: u64,
}

impl std::fmt::Display for CanvasCourse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.id)
    }
}

/// Why a group list cannot be stored on a guild.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupConflict {
    #[error("duplicate group name: {0}")]
    DuplicateName(String),
    #[error("duplicate group emoji: {0}")]
    DuplicateEmoji(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    #[serde(rename = "_id")]
    pub id: GuildId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    /// The tracking message whose reactions drive role assignment.
    #[serde(default)]
    pub role_message: Option<MessageId>,
    #[serde(default)]
    pub canvas_courses: Vec<CanvasCourse>,
    #[serde(default)]
    pub github_orgs: Vec<String>,
}

impl Guild {
    pub fn new(id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            groups: Vec::new(),
            role_message: None,
            canvas_courses: Vec::new(),
            github_orgs: Vec::new(),
        }
    }

    /// A semester is active while a tracking message is recorded.
    pub fn is_active(&self) -> bool {
        self.role_message.is_some()
    }

    /// The group selected by a reaction emoji, compared in normalized form.
    pub fn group_by_emoji(&self, emoji: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.matches_emoji(emoji))
    }

    /// Replace the active group set and tracking message.
    ///
    /// Rejects lists with repeated names or emojis; the guild is left
    /// untouched in that case.
    pub fn start_semester(
        &mut self,
        groups: Vec<Group>,
        role_message: MessageId,
    ) -> Result<(), GroupConflict> {
        validate_groups(&groups)?;
        self.groups = groups;
        self.role_message = Some(role_message);
        Ok(())
    }

    /// Forget the tracking message and the group set.  Idempotent.
    pub fn end_semester(&mut self) {
        self.groups.clear();
        self.role_message = None;
    }

    /// Keep only the groups named in `names`; the tracking message stays.
    pub fn retain_groups(&mut self, names: &[String]) {
        self.groups.retain(|g| names.contains(&g.name));
    }

    /// Track `course` unless a course with the same id is already present.
    /// Returns `true` when the course was added.
    pub fn add_canvas_course(&mut self, course: CanvasCourse) -> bool {
        if self.canvas_courses.iter().any(|c| c.id == course.id) {
            return false;
        }
        self.canvas_courses.push(course);
        true
    }
}

pub fn validate_groups(groups: &[Group]) -> Result<(), GroupConflict> {
    let mut names = HashSet::new();
    let mut emojis = HashSet::new();
    for g in groups {
        if !names.insert(g.name.as_str()) {
            return Err(GroupConflict::DuplicateName(g.name.clone()));
        }
        if !emojis.insert(g.emoji.as_str()) {
            return Err(GroupConflict::DuplicateEmoji(g.emoji.clone()));
        }
    }
    Ok(())
}
