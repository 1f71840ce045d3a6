//! Acting user identity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user on whose behalf an operation runs, as resolved from the
/// request credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl Actor {
    pub fn new(
        id: Uuid,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: role.into(),
        }
    }

    /// Name shown on notifications and audit logs
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_joins_first_and_last() {
        let actor = Actor::new(Uuid::nil(), "Ada", "Obi", "admin");
        assert_eq!(actor.display_name(), "Ada Obi");
    }

    #[test]
    fn test_display_name_without_last_name() {
        let actor = Actor::new(Uuid::nil(), "Ada", "", "staff");
        assert_eq!(actor.display_name(), "Ada");
    }
}
