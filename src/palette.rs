//! Emoji palette: the pool group emojis are drawn from.
//!
//! A palette file is JSON, either an object mapping names to glyphs
//! (`{"apple": "🍎", ...}`) or a plain array of glyphs.  Without a file the
//! built-in palette is used.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{AppError, CourseError};

const BUILTIN: &[&str] = &[
    "🍎", "🍐", "🍊", "🍋", "🍌", "🍉", "🍇", "🍓", "🫐", "🍒",
    "🍑", "🥭", "🍍", "🥥", "🥝", "🍅", "🥑", "🥦", "🌽", "🥕",
    "🦀", "🐙", "🦊", "🐼", "🐸", "🦉", "🐝", "🦋", "🐢", "🦔",
    "🚀", "⚓", "🎲", "🎸", "🔭", "🧲", "🧪", "🪐", "🌵", "🍄",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    emojis: Vec<String>,
}

impl Palette {
    /// Build a palette, dropping repeated glyphs while keeping first-seen order.
    pub fn new<I, S>(emojis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let emojis = emojis
            .into_iter()
            .map(Into::into)
            .filter(|e: &String| !e.is_empty() && seen.insert(e.clone()))
            .collect();
        Self { emojis }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN.iter().copied())
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read palette {}: {e}", path.display())))?;
        Self::from_json(&raw)
            .map_err(|e| AppError::Config(format!("bad palette {}: {e}", path.display())))
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let glyphs: Vec<String> = match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .filter_map(|(_, v)| v.as_str().map(str::to_string))
                .collect(),
            other => serde_json::from_value(other)?,
        };
        Ok(Self::new(glyphs))
    }

    pub fn len(&self) -> usize {
        self.emojis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emojis.is_empty()
    }

    pub fn contains(&self, emoji: &str) -> bool {
        self.emojis.iter().any(|e| e == emoji)
    }

    /// Draw `count` distinct emojis without replacement.
    pub fn sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Result<Vec<String>, CourseError> {
        if count > self.emojis.len() {
            return Err(CourseError::EmojiPoolExhausted {
                requested: count,
                available: self.emojis.len(),
            });
        }
        Ok(self.emojis.choose_multiple(rng, count).cloned().collect())
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::builtin()
    }
}
