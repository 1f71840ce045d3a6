//! Notification and audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Actor;

/// An append-only notification written on behalf of an actor.
///
/// `is_read` is the only field that changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub role: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build an unread notification for `actor`
    pub fn unread(actor: &Actor, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor.id,
            actor_name: actor.display_name(),
            role: actor.role.clone(),
            message: message.into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}
