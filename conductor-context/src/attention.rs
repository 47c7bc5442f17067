//! Attention focus list.

use conductor_core::{clamp_unit, new_entity_id, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of items held in focus.
pub const MAX_FOCUS_ITEMS: usize = 50;

/// How strongly an item holds attention, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionLevel {
    Background,
    Peripheral,
    Focused,
    Conscious,
}

impl AttentionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionLevel::Background => "background",
            AttentionLevel::Peripheral => "peripheral",
            AttentionLevel::Focused => "focused",
            AttentionLevel::Conscious => "conscious",
        }
    }

    /// Level for a combined attention score in [0, 1].
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            AttentionLevel::Conscious
        } else if score > 0.6 {
            AttentionLevel::Focused
        } else if score > 0.4 {
            AttentionLevel::Peripheral
        } else {
            AttentionLevel::Background
        }
    }
}

impl fmt::Display for AttentionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Something the run is paying attention to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionItem {
    pub id: EntityId,
    pub content: String,
    pub source: String,
    pub priority: f64,
    pub salience: f64,
    pub level: AttentionLevel,
    pub timestamp: Timestamp,
}

impl AttentionItem {
    /// Create an item; the level is derived from `(priority + salience) / 2`.
    pub fn new(
        content: impl Into<String>,
        source: impl Into<String>,
        priority: f64,
        salience: f64,
    ) -> Self {
        let priority = clamp_unit(priority);
        let salience = clamp_unit(salience);
        Self {
            id: new_entity_id(),
            content: content.into(),
            source: source.into(),
            priority,
            salience,
            level: AttentionLevel::from_score((priority + salience) / 2.0),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered focus list: conscious items first (newest first), then the rest by
/// descending priority.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttentionState {
    focus: Vec<AttentionItem>,
}

impl AttentionState {
    pub fn attend(&mut self, item: AttentionItem) {
        let position = if item.level == AttentionLevel::Conscious {
            0
        } else {
            self.focus
                .iter()
                .position(|existing| {
                    existing.level != AttentionLevel::Conscious && existing.priority < item.priority
                })
                .unwrap_or(self.focus.len())
        };
        self.focus.insert(position, item);
        self.focus.truncate(MAX_FOCUS_ITEMS);
    }

    pub fn focus(&self) -> &[AttentionItem] {
        &self.focus
    }

    /// Item currently at the front of attention.
    pub fn current(&self) -> Option<&AttentionItem> {
        self.focus.first()
    }

    pub fn len(&self) -> usize {
        self.focus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.focus.is_empty()
    }
}
