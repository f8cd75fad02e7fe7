//! Script and Role types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoleId, ScriptId};

/// An uploaded play or text document together with its extracted roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Backend-assigned identifier.
    pub id: ScriptId,

    /// Display title.
    pub title: String,

    /// Full script text.
    pub content: String,

    /// When the script was added.
    pub created_at: DateTime<Utc>,

    /// When the script was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Roles extracted by analysis, in backend order.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Script {
    /// Create a script with no roles.
    pub fn new(id: ScriptId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
            roles: Vec::new(),
        }
    }

    /// Builder method to attach roles.
    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    /// Look up a role by id.
    pub fn role(&self, role_id: &RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| &r.id == role_id)
    }

    /// Advance `updated_at`, never moving it backwards or leaving it unchanged.
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = now.max(floor);
    }
}

/// A character extracted from a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Identifier, unique within the owning script.
    pub id: RoleId,

    /// Character name.
    pub name: String,

    /// Personality description.
    pub character: String,

    /// Language-habit description.
    pub language_habit: String,
}

impl Role {
    pub fn new(
        id: impl Into<RoleId>,
        name: impl Into<String>,
        character: impl Into<String>,
        language_habit: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            character: character.into(),
            language_habit: language_habit.into(),
        }
    }

    /// Apply a patch, returning the merged role.
    pub fn patched(&self, patch: &RolePatch) -> Role {
        Role {
            id: self.id.clone(),
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            character: patch
                .character
                .clone()
                .unwrap_or_else(|| self.character.clone()),
            language_habit: patch
                .language_habit
                .clone()
                .unwrap_or_else(|| self.language_habit.clone()),
        }
    }
}

/// Field updates for a script. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    /// Replaces the role list when set; otherwise the existing roles are kept.
    pub roles: Option<Vec<Role>>,
}

impl ScriptUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Field updates for a role. The id is never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    pub name: Option<String>,
    pub character: Option<String>,
    pub language_habit: Option<String>,
}

impl RolePatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.character.is_none() && self.language_habit.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_is_strictly_monotonic() {
        let mut script = Script::new(ScriptId::new("s1"), "Hamlet", "...");
        // Push the stamp into the future so the wall clock cannot catch up.
        script.updated_at = Utc::now() + Duration::hours(1);
        let before = script.updated_at;
        script.touch();
        assert!(script.updated_at > before);
    }

    #[test]
    fn test_role_patch_merges_only_set_fields() {
        let role = Role::new("r1", "Hamlet", "brooding", "soliloquies");
        let patched = role.patched(&RolePatch {
            character: Some("decisive".into()),
            ..RolePatch::default()
        });
        assert_eq!(patched.name, "Hamlet");
        assert_eq!(patched.character, "decisive");
        assert_eq!(patched.language_habit, "soliloquies");
    }

    #[test]
    fn test_script_record_uses_camel_case_timestamps() {
        let script = Script::new(ScriptId::new("s1"), "t", "c");
        let json = serde_json::to_value(&script).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json["roles"].as_array().unwrap().is_empty());
    }
}
