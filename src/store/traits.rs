//! Storage traits: workflow checkpoints and namespaced profile entries.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::workflow::Checkpoint;

/// Durable mapping from thread key to the latest workflow checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `checkpoint` as the latest snapshot for `thread_id`.
    async fn save(&self, thread_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError>;

    /// Load the latest checkpoint for `thread_id`, if any.
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, DatabaseError>;
}

/// Profile attribute category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Name,
    Interests,
    Preferences,
    Goals,
}

impl ProfileType {
    pub const ALL: [ProfileType; 4] = [
        ProfileType::Name,
        ProfileType::Interests,
        ProfileType::Preferences,
        ProfileType::Goals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Interests => "interests",
            Self::Preferences => "preferences",
            Self::Goals => "goals",
        }
    }

    /// Display label used when rendering the profile.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Interests => "Interests",
            Self::Preferences => "Preferences",
            Self::Goals => "Goals",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "interests" => Ok(Self::Interests),
            "preferences" => Ok(Self::Preferences),
            "goals" => Ok(Self::Goals),
            other => Err(format!(
                "Invalid profile_type: '{other}'. Valid types are: name, interests, preferences, goals."
            )),
        }
    }
}

/// Partition key for profile entries: `(user_id, scope)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub user_id: String,
    pub scope: String,
}

impl Namespace {
    /// The `(user_id, "profile")` namespace.
    pub fn profile(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            scope: "profile".to_string(),
        }
    }
}

/// A stored profile attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileEntry {
    /// Opaque key (a UUID for entries created by tools).
    pub key: String,
    pub profile_type: ProfileType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Search filter for profile entries. Results come back in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub profile_type: Option<ProfileType>,
    pub limit: Option<usize>,
}

impl ProfileFilter {
    pub fn of_type(profile_type: ProfileType) -> Self {
        Self {
            profile_type: Some(profile_type),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Namespaced key-value store for user profile attributes.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace the entry stored under `entry.key`.
    async fn put(&self, namespace: &Namespace, entry: &ProfileEntry) -> Result<(), DatabaseError>;

    async fn search(
        &self,
        namespace: &Namespace,
        filter: &ProfileFilter,
    ) -> Result<Vec<ProfileEntry>, DatabaseError>;

    /// Delete an entry; returns whether anything was removed.
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, DatabaseError>;
}
