//! UI state for rendering.

use std::time::{Duration, Instant};

use scriptchat_client::ConversationMode;
use scriptchat_core::{Role, RoleId, RolePatch, ScriptId};

use crate::event::ConversationSnapshot;

/// How long a footer notification stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

/// Available views in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Scripts,
    Roles,
    Chat,
}

impl View {
    pub fn all() -> &'static [View] {
        &[View::Scripts, View::Roles, View::Chat]
    }

    pub fn name(&self) -> &'static str {
        match self {
            View::Scripts => "[1] Scripts",
            View::Roles => "[2] Roles",
            View::Chat => "[3] Chat",
        }
    }

    pub fn next(&self) -> View {
        match self {
            View::Scripts => View::Roles,
            View::Roles => View::Chat,
            View::Chat => View::Scripts,
        }
    }

    pub fn prev(&self) -> View {
        match self {
            View::Scripts => View::Chat,
            View::Roles => View::Scripts,
            View::Chat => View::Roles,
        }
    }
}

/// A role field that can be edited from the Roles view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleField {
    Name,
    Character,
    LanguageHabit,
}

impl RoleField {
    pub fn label(&self) -> &'static str {
        match self {
            RoleField::Name => "Name",
            RoleField::Character => "Character",
            RoleField::LanguageHabit => "Language habit",
        }
    }

    /// Current value of this field.
    pub fn read<'a>(&self, role: &'a Role) -> &'a str {
        match self {
            RoleField::Name => &role.name,
            RoleField::Character => &role.character,
            RoleField::LanguageHabit => &role.language_habit,
        }
    }

    /// Patch that sets only this field.
    pub fn patch(&self, value: String) -> RolePatch {
        let mut patch = RolePatch::default();
        match self {
            RoleField::Name => patch.name = Some(value),
            RoleField::Character => patch.character = Some(value),
            RoleField::LanguageHabit => patch.language_habit = Some(value),
        }
        patch
    }
}

/// Modal text prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Path of a script file to upload.
    UploadPath,

    /// New value for one field of a role.
    EditRole {
        script_id: ScriptId,
        role_id: RoleId,
        field: RoleField,
    },
}

impl Prompt {
    pub fn title(&self) -> &'static str {
        match self {
            Prompt::UploadPath => "Upload Script",
            Prompt::EditRole { .. } => "Edit Role",
        }
    }

    pub fn label(&self) -> String {
        match self {
            Prompt::UploadPath => "Path of the script file:".to_string(),
            Prompt::EditRole { role_id, field, .. } => {
                format!("{} of {}:", field.label(), role_id)
            }
        }
    }
}

/// Single-line text input. The cursor counts chars, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    /// Input prefilled with `value`, cursor at the end.
    pub fn with_value(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn insert(&mut self, c: char) {
        let idx = self.byte_index(self.cursor);
        self.value.insert(idx, c);
        self.cursor += 1;
    }

    /// Remove the char before the cursor.
    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.remove_at_cursor();
        }
    }

    /// Remove the char under the cursor.
    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            self.remove_at_cursor();
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        if self.cursor < self.value.chars().count() {
            self.cursor += 1;
        }
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    /// Take the value and clear the input.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }

    fn remove_at_cursor(&mut self) {
        if let Some((idx, ch)) = self.value.char_indices().nth(self.cursor) {
            self.value.replace_range(idx..idx + ch.len_utf8(), "");
        }
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Transient footer message.
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub shown_at: Instant,
}

/// Chat view state.
///
/// `epoch` changes on every participant switch; conversation events tagged
/// with an older epoch are stale and dropped.
#[derive(Debug, Default)]
pub struct ChatState {
    pub epoch: u64,
    pub assistant: Option<RoleId>,
    pub user: Option<RoleId>,
    pub snapshot: ConversationSnapshot,
    pub input: TextInput,
    pub input_focused: bool,
}

impl ChatState {
    pub fn mode(&self) -> ConversationMode {
        if self.user.is_some() {
            ConversationMode::Dual
        } else {
            ConversationMode::Single
        }
    }

    pub fn is_open(&self) -> bool {
        self.assistant.is_some()
    }

    /// Switch to a new participant pair. Returns the new epoch.
    pub fn open(&mut self, user: Option<RoleId>, assistant: RoleId) -> u64 {
        self.epoch += 1;
        self.user = user;
        self.assistant = Some(assistant);
        self.snapshot = ConversationSnapshot::default();
        self.epoch
    }

    pub fn close(&mut self) {
        self.epoch += 1;
        self.user = None;
        self.assistant = None;
        self.snapshot = ConversationSnapshot::default();
        self.input_focused = false;
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.is_open() && epoch == self.epoch
    }

    /// Install a snapshot unless it belongs to a superseded pair.
    pub fn accept(&mut self, epoch: u64, snapshot: ConversationSnapshot) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        self.snapshot = snapshot;
        true
    }
}

/// Snapshot of UI-only data for rendering (no async, no locks).
#[derive(Debug, Default)]
pub struct UiState {
    /// Current view/tab.
    pub current_view: View,

    /// Highlighted row in the Scripts view.
    pub script_index: usize,

    /// Highlighted row in the Roles view.
    pub role_index: usize,

    pub chat: ChatState,

    /// Open modal prompt, if any.
    pub prompt: Option<Prompt>,
    pub prompt_input: TextInput,

    /// REST requests still in flight.
    pub pending_requests: usize,

    pub notification: Option<Notification>,
}

impl UiState {
    pub fn notify(&mut self, message: impl Into<String>) {
        self.set_notification(message.into(), NotificationLevel::Info);
    }

    pub fn notify_error(&mut self, message: impl Into<String>) {
        self.set_notification(message.into(), NotificationLevel::Error);
    }

    fn set_notification(&mut self, message: String, level: NotificationLevel) {
        self.notification = Some(Notification {
            message,
            level,
            shown_at: Instant::now(),
        });
    }

    /// The notification, while it has not expired.
    pub fn active_notification(&self) -> Option<&Notification> {
        self.notification
            .as_ref()
            .filter(|n| n.shown_at.elapsed() < NOTIFICATION_TTL)
    }

    pub fn open_prompt(&mut self, prompt: Prompt, initial: &str) {
        self.prompt = Some(prompt);
        self.prompt_input = TextInput::with_value(initial);
    }

    pub fn close_prompt(&mut self) {
        self.prompt = None;
        self.prompt_input = TextInput::default();
    }
}

/// Move a list cursor one step, clamped to `len`.
pub fn step(index: &mut usize, len: usize, forward: bool) {
    if len == 0 {
        *index = 0;
    } else if forward {
        *index = (*index + 1).min(len - 1);
    } else {
        *index = index.saturating_sub(1);
    }
}

/// The role after `current`, wrapping around. Starts at the first role when
/// `current` is unset or no longer listed.
pub fn cycle_role(roles: &[Role], current: Option<&RoleId>) -> Option<RoleId> {
    let next = match current.and_then(|id| roles.iter().position(|r| &r.id == id)) {
        Some(i) => (i + 1) % roles.len(),
        None => 0,
    };
    roles.get(next).map(|r| r.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> Vec<Role> {
        vec![
            Role::new("hamlet", "Hamlet", "brooding", "verse"),
            Role::new("ophelia", "Ophelia", "gentle", "song"),
            Role::new("polonius", "Polonius", "verbose", "maxims"),
        ]
    }

    #[test]
    fn test_text_input_editing_is_char_based() {
        let mut input = TextInput::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        assert_eq!(input.cursor(), 5);

        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.value(), "hélo");

        input.home();
        input.delete();
        assert_eq!(input.value(), "élo");

        input.end();
        input.insert('!');
        assert_eq!(input.value(), "élo!");

        assert_eq!(input.take(), "élo!");
        assert!(input.is_empty());
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn test_text_input_bounds() {
        let mut input = TextInput::with_value("ab");
        input.right();
        assert_eq!(input.cursor(), 2);
        input.delete();
        assert_eq!(input.value(), "ab");

        input.home();
        input.left();
        input.backspace();
        assert_eq!(input.value(), "ab");
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn test_chat_drops_superseded_snapshots() {
        let mut chat = ChatState::default();
        let first = chat.open(None, RoleId::new("hamlet"));
        let second = chat.open(Some(RoleId::new("ophelia")), RoleId::new("hamlet"));
        assert_ne!(first, second);
        assert_eq!(chat.mode(), ConversationMode::Dual);

        let stale = ConversationSnapshot {
            streaming: "old".into(),
            receiving: true,
            ..ConversationSnapshot::default()
        };
        assert!(!chat.accept(first, stale));
        assert!(chat.snapshot.streaming.is_empty());

        let fresh = ConversationSnapshot {
            streaming: "new".into(),
            receiving: true,
            ..ConversationSnapshot::default()
        };
        assert!(chat.accept(second, fresh));
        assert_eq!(chat.snapshot.streaming, "new");
    }

    #[test]
    fn test_closed_chat_accepts_nothing() {
        let mut chat = ChatState::default();
        let epoch = chat.open(None, RoleId::new("hamlet"));
        chat.close();
        assert!(!chat.is_open());
        assert!(!chat.accept(epoch, ConversationSnapshot::default()));
        assert!(!chat.accept(chat.epoch, ConversationSnapshot::default()));
        assert_eq!(chat.mode(), ConversationMode::Single);
    }

    #[test]
    fn test_cycle_role_wraps() {
        let roles = roles();
        assert_eq!(cycle_role(&roles, None), Some(RoleId::new("hamlet")));
        assert_eq!(
            cycle_role(&roles, Some(&RoleId::new("hamlet"))),
            Some(RoleId::new("ophelia"))
        );
        assert_eq!(
            cycle_role(&roles, Some(&RoleId::new("polonius"))),
            Some(RoleId::new("hamlet"))
        );
        assert_eq!(
            cycle_role(&roles, Some(&RoleId::new("ghost"))),
            Some(RoleId::new("hamlet"))
        );
        assert_eq!(cycle_role(&[], None), None);
    }

    #[test]
    fn test_step_clamps() {
        let mut index = 0;
        step(&mut index, 3, false);
        assert_eq!(index, 0);
        step(&mut index, 3, true);
        step(&mut index, 3, true);
        step(&mut index, 3, true);
        assert_eq!(index, 2);
        step(&mut index, 0, true);
        assert_eq!(index, 0);
    }

    #[test]
    fn test_role_field_patch_sets_one_field() {
        let patch = RoleField::Character.patch("melancholic".into());
        assert_eq!(patch.character.as_deref(), Some("melancholic"));
        assert!(patch.name.is_none());
        assert!(patch.language_habit.is_none());

        let role = roles().remove(0).patched(&patch);
        assert_eq!(RoleField::Character.read(&role), "melancholic");
        assert_eq!(RoleField::Name.read(&role), "Hamlet");
    }

    #[test]
    fn test_notification_expires() {
        let mut state = UiState::default();
        assert!(state.active_notification().is_none());

        state.notify_error("boom");
        let active = state.active_notification().map(|n| n.level);
        assert_eq!(active, Some(NotificationLevel::Error));

        if let Some(past) = Instant::now().checked_sub(NOTIFICATION_TTL * 2) {
            if let Some(n) = state.notification.as_mut() {
                n.shown_at = past;
            }
            assert!(state.active_notification().is_none());
        }
    }
}
