//! In-memory view state: the script collection and the current selection.
//!
//! The selection is kept as an id and resolved on read, so mutating a script
//! is always visible through `selected_script()`.

use std::collections::HashSet;

use tracing::debug;

use crate::{CoreError, Role, RoleId, RolePatch, Script, ScriptId, ScriptUpdate};

/// Ordered scripts (most recently added first) plus the selected script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptStore {
    scripts: Vec<Script>,
    selected: Option<ScriptId>,
}

impl ScriptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from stored parts.
    ///
    /// Duplicate script ids keep their first occurrence, and a selection that
    /// names no stored script is dropped.
    pub fn from_parts(scripts: Vec<Script>, selected: Option<ScriptId>) -> Self {
        let mut seen = HashSet::new();
        let scripts: Vec<Script> = scripts
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .collect();
        let selected = selected.filter(|id| scripts.iter().any(|s| &s.id == id));
        Self { scripts, selected }
    }

    /// All scripts, most recently added first.
    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    /// Look up a script by id.
    pub fn script(&self, id: &ScriptId) -> Option<&Script> {
        self.scripts.iter().find(|s| &s.id == id)
    }

    /// Roles of a script; empty when the script is unknown.
    pub fn script_roles(&self, id: &ScriptId) -> &[Role] {
        self.script(id).map(|s| s.roles.as_slice()).unwrap_or(&[])
    }

    /// The currently selected script.
    pub fn selected_script(&self) -> Option<&Script> {
        self.selected.as_ref().and_then(|id| self.script(id))
    }

    /// Id of the currently selected script.
    pub fn selected_id(&self) -> Option<&ScriptId> {
        self.selected.as_ref()
    }

    /// Add a script at the front of the collection.
    pub fn add_script(&mut self, script: Script) -> Result<(), CoreError> {
        if self.script(&script.id).is_some() {
            return Err(CoreError::DuplicateScript(script.id.into_inner()));
        }
        ensure_unique_roles(&script.id, &script.roles)?;
        debug!(script_id = %script.id, title = %script.title, "Adding script");
        self.scripts.insert(0, script);
        Ok(())
    }

    /// Merge field updates into a script.
    ///
    /// Roles are kept unless the update explicitly replaces them.
    pub fn update_script(&mut self, id: &ScriptId, update: ScriptUpdate) -> Result<(), CoreError> {
        if let Some(roles) = &update.roles {
            ensure_unique_roles(id, roles)?;
        }
        let script = self.script_mut(id)?;
        if let Some(title) = update.title {
            script.title = title;
        }
        if let Some(content) = update.content {
            script.content = content;
        }
        if let Some(roles) = update.roles {
            script.roles = roles;
        }
        script.touch();
        debug!(script_id = %id, "Updated script");
        Ok(())
    }

    /// Replace a script's role list wholesale.
    pub fn set_script_roles(&mut self, id: &ScriptId, roles: Vec<Role>) -> Result<(), CoreError> {
        ensure_unique_roles(id, &roles)?;
        let script = self.script_mut(id)?;
        debug!(script_id = %id, count = roles.len(), "Replacing roles");
        script.roles = roles;
        script.touch();
        Ok(())
    }

    /// Patch a single role of a script by id.
    pub fn update_script_role(
        &mut self,
        script_id: &ScriptId,
        role_id: &RoleId,
        patch: &RolePatch,
    ) -> Result<(), CoreError> {
        let script = self.script_mut(script_id)?;
        let role = script
            .roles
            .iter_mut()
            .find(|r| &r.id == role_id)
            .ok_or_else(|| CoreError::RoleNotFound {
                script: script_id.to_string(),
                role: role_id.to_string(),
            })?;
        *role = role.patched(patch);
        script.touch();
        debug!(script_id = %script_id, role_id = %role_id, "Patched role");
        Ok(())
    }

    /// Select a script, or clear the selection with `None`.
    pub fn select_script(&mut self, id: Option<&ScriptId>) -> Result<(), CoreError> {
        match id {
            Some(id) if self.script(id).is_none() => {
                Err(CoreError::ScriptNotFound(id.to_string()))
            }
            _ => {
                self.selected = id.cloned();
                Ok(())
            }
        }
    }

    fn script_mut(&mut self, id: &ScriptId) -> Result<&mut Script, CoreError> {
        self.scripts
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| CoreError::ScriptNotFound(id.to_string()))
    }
}

fn ensure_unique_roles(script_id: &ScriptId, roles: &[Role]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for role in roles {
        if !seen.insert(&role.id) {
            return Err(CoreError::DuplicateRole {
                script: script_id.to_string(),
                role: role.id.to_string(),
            });
        }
    }
    Ok(())
}
