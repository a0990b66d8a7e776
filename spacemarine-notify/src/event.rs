use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::NotifyError;

/// Keys the wire message owns; extra fields may not shadow them
const RESERVED_KEYS: [&str; 4] = ["action", "id", "type", "chapterId"];

/// Routing key partitioning subscribers by entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Chapters,
    Marines,
    Persons,
}

impl Topic {
    pub const ALL: [Self; 3] = [Self::Chapters, Self::Marines, Self::Persons];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chapters => "chapters",
            Self::Marines => "marines",
            Self::Persons => "persons",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "chapters" => Ok(Self::Chapters),
            "marines" => Ok(Self::Marines),
            "persons" => Ok(Self::Persons),
            other => Err(NotifyError::UnknownTopic(other.to_string())),
        }
    }
}

/// Kind of entity a change refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Chapter,
    Marine,
    Person,
}

/// Topic whose subscribers care about `entity_type`
#[must_use]
pub const fn topic_for(entity_type: EntityType) -> Topic {
    match entity_type {
        EntityType::Chapter => Topic::Chapters,
        EntityType::Marine => Topic::Marines,
        EntityType::Person => Topic::Persons,
    }
}

impl EntityType {
    /// `type` discriminator on the wire. Marines live alone on their topic
    /// and go without one.
    const fn discriminator(self) -> Option<&'static str> {
        match self {
            Self::Chapter => Some("chapter"),
            Self::Marine => None,
            Self::Person => Some("person"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
    CascadeDelete,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::CascadeDelete => "cascade_delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed mutation, ready to publish
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    entity_type: EntityType,
    action: Action,
    subject_id: i64,
    extra: Option<Map<String, Value>>,
}

impl ChangeEvent {
    #[must_use]
    pub const fn new(entity_type: EntityType, action: Action, subject_id: i64) -> Self {
        Self {
            entity_type,
            action,
            subject_id,
            extra: None,
        }
    }

    /// Event telling marine subscribers that every marine of `chapter_id` is gone
    #[must_use]
    pub const fn cascade_delete(chapter_id: i64) -> Self {
        Self::new(EntityType::Marine, Action::CascadeDelete, chapter_id)
    }

    #[must_use]
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub const fn subject_id(&self) -> i64 {
        self.subject_id
    }

    #[must_use]
    pub const fn extra(&self) -> Option<&Map<String, Value>> {
        self.extra.as_ref()
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        topic_for(self.entity_type)
    }

    /// Build the transport-agnostic message object
    #[must_use]
    pub fn to_message(&self) -> Map<String, Value> {
        let mut message = Map::new();

        if let Some(extra) = &self.extra {
            for (key, value) in extra {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    message.insert(key.clone(), value.clone());
                }
            }
        }

        message.insert("action".to_string(), Value::from(self.action.as_str()));

        if self.action == Action::CascadeDelete {
            message.insert("chapterId".to_string(), Value::from(self.subject_id));
            message.insert("type".to_string(), Value::from("marine_cleanup"));
        } else {
            message.insert("id".to_string(), Value::from(self.subject_id));
            if let Some(kind) = self.entity_type.discriminator() {
                message.insert("type".to_string(), Value::from(kind));
            }
        }

        message
    }

    /// Serialize to the JSON text sent over the wire
    pub fn to_json(&self) -> Result<String, NotifyError> {
        Ok(serde_json::to_string(&self.to_message())?)
    }
}
