//! Application state and main event loop.

use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use scriptchat_core::{CoreError, PersistentStore, Role, RoleId};

use crate::event::{BackendCommand, UiEvent};
use crate::state::{cycle_role, step, Prompt, RoleField, TextInput, UiState, View};
use crate::ui;

/// Main application: UI state, the persisted store, and channel handles.
pub struct App {
    /// Current UI state for rendering.
    state: UiState,

    /// Scripts and roles. Only the UI thread touches the store.
    store: PersistentStore,

    /// Receiver for events from the backend.
    ui_rx: mpsc::Receiver<UiEvent>,

    /// Sender for commands to the backend.
    cmd_tx: mpsc::Sender<BackendCommand>,
}

impl App {
    /// Create a new application instance with channel handles.
    pub fn new(
        store: PersistentStore,
        ui_rx: mpsc::Receiver<UiEvent>,
        cmd_tx: mpsc::Sender<BackendCommand>,
    ) -> Self {
        let mut state = UiState::default();
        if let Some(id) = store.store().selected_id() {
            state.script_index = store
                .store()
                .scripts()
                .iter()
                .position(|s| &s.id == id)
                .unwrap_or(0);
        }

        Self {
            state,
            store,
            ui_rx,
            cmd_tx,
        }
    }

    /// Run the main event loop.
    ///
    /// This runs on the main thread and handles:
    /// - Drawing the UI
    /// - Processing keyboard input
    /// - Receiving updates from the backend
    pub fn run(&mut self, mut terminal: DefaultTerminal) -> std::io::Result<()> {
        loop {
            terminal.draw(|frame| ui::render(frame, &self.state, self.store.store()))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break; // quit requested
                    }
                }
            }

            // Process backend events (non-blocking)
            while let Ok(event) = self.ui_rx.try_recv() {
                self.apply_event(event);
            }
        }

        // Dropping the conversation in the backend cancels any running reply.
        self.send(BackendCommand::Quit);

        Ok(())
    }

    fn send(&self, cmd: BackendCommand) {
        if self.cmd_tx.blocking_send(cmd).is_err() {
            warn!("Backend is gone, command dropped");
        }
    }

    /// Send a REST command and count it as pending.
    fn start_request(&mut self, cmd: BackendCommand) {
        self.state.pending_requests += 1;
        self.send(cmd);
    }

    fn finish_request(&mut self) {
        self.state.pending_requests = self.state.pending_requests.saturating_sub(1);
    }

    /// Apply an event from the backend to the UI state and the store.
    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::ScriptUploaded(result) => {
                self.finish_request();
                match result {
                    Ok(script) => {
                        let title = script.title.clone();
                        match self.store.mutate(|s| s.add_script(script)) {
                            Ok(()) => {
                                self.state.script_index = 0;
                                self.state.notify(format!("Uploaded '{title}'"));
                            }
                            Err(e) => self.state.notify_error(e.to_string()),
                        }
                    }
                    Err(message) => self.state.notify_error(format!("Upload failed: {message}")),
                }
            }

            UiEvent::RolesAnalyzed { script_id, result } => {
                self.finish_request();
                match result {
                    Ok(roles) => {
                        let count = roles.len();
                        match self.store.mutate(|s| s.set_script_roles(&script_id, roles)) {
                            Ok(()) => {
                                if self.store.store().selected_id() == Some(&script_id) {
                                    // Old participants may be gone.
                                    self.close_chat();
                                    self.state.role_index = 0;
                                }
                                self.state.notify(format!("Found {count} roles"));
                            }
                            Err(e) => self.state.notify_error(e.to_string()),
                        }
                    }
                    Err(message) => self.state.notify_error(format!("Analysis failed: {message}")),
                }
            }

            UiEvent::RoleUpdated {
                script_id,
                role_id,
                patch,
                result,
            } => {
                self.finish_request();
                match result {
                    Ok(()) => {
                        match self
                            .store
                            .mutate(|s| s.update_script_role(&script_id, &role_id, &patch))
                        {
                            Ok(()) => self.state.notify(format!("Updated role {role_id}")),
                            Err(e) => self.state.notify_error(e.to_string()),
                        }
                    }
                    Err(message) => self.state.notify_error(format!("Role update failed: {message}")),
                }
            }

            UiEvent::Conversation { epoch, snapshot } => {
                if !self.state.chat.accept(epoch, snapshot) {
                    debug!(epoch, current = self.state.chat.epoch, "Dropped stale conversation snapshot");
                }
            }

            UiEvent::ChatFailed { epoch, message } => {
                if self.state.chat.is_current(epoch) {
                    self.state.notify_error(message);
                }
            }
        }
    }

    fn selected_roles(&self) -> &[Role] {
        self.store
            .store()
            .selected_script()
            .map(|s| s.roles.as_slice())
            .unwrap_or(&[])
    }

    fn open_chat(&mut self, user: Option<RoleId>, assistant: RoleId) {
        let epoch = self.state.chat.open(user.clone(), assistant.clone());
        self.send(BackendCommand::OpenChat {
            epoch,
            user,
            assistant,
        });
    }

    fn close_chat(&mut self) {
        if self.state.chat.is_open() {
            self.state.chat.close();
            self.send(BackendCommand::CloseChat);
        }
    }

    /// Open a guest chat with the first role when none is open.
    fn ensure_chat(&mut self) {
        if self.state.chat.is_open() {
            return;
        }
        if let Some(first) = self.selected_roles().first().map(|r| r.id.clone()) {
            self.open_chat(None, first);
        }
    }

    fn switch_view(&mut self, view: View) {
        self.state.current_view = view;
        if view == View::Chat {
            self.ensure_chat();
        }
    }

    /// Select the highlighted script, or clear the selection if it is
    /// already selected.
    fn toggle_selected_script(&mut self) {
        let Some(script) = self.store.store().scripts().get(self.state.script_index) else {
            return;
        };
        let id = script.id.clone();
        let target = if self.store.store().selected_id() == Some(&id) {
            None
        } else {
            Some(id)
        };

        match self.store.mutate(|s| s.select_script(target.as_ref())) {
            Ok(()) => {
                self.close_chat();
                self.state.role_index = 0;
                match target {
                    Some(id) => self.state.notify(format!("Selected {id}")),
                    None => self.state.notify("Selection cleared"),
                }
            }
            Err(e) => self.state.notify_error(e.to_string()),
        }
    }

    fn submit_prompt(&mut self) {
        let Some(prompt) = self.state.prompt.take() else {
            return;
        };
        let value = self.state.prompt_input.take();

        match prompt {
            Prompt::UploadPath => {
                let path = value.trim();
                if path.is_empty() {
                    return;
                }
                self.start_request(BackendCommand::UploadScript {
                    path: PathBuf::from(path),
                    title: None,
                });
                self.state.notify("Uploading...");
            }
            Prompt::EditRole {
                script_id,
                role_id,
                field,
            } => {
                let Some(role) = self
                    .store
                    .store()
                    .script(&script_id)
                    .and_then(|s| s.role(&role_id))
                else {
                    let err = CoreError::RoleNotFound {
                        script: script_id.to_string(),
                        role: role_id.to_string(),
                    };
                    self.state.notify_error(err.to_string());
                    return;
                };
                let patch = field.patch(value);
                let role = role.patched(&patch);
                self.start_request(BackendCommand::UpdateRole {
                    script_id,
                    role,
                    patch,
                });
            }
        }
    }

    fn edit_role_field(&mut self, field: RoleField) {
        let Some(script) = self.store.store().selected_script() else {
            return;
        };
        let Some(role) = script.roles.get(self.state.role_index) else {
            return;
        };
        let prompt = Prompt::EditRole {
            script_id: script.id.clone(),
            role_id: role.id.clone(),
            field,
        };
        let initial = field.read(role).to_string();
        self.state.open_prompt(prompt, &initial);
    }

    /// Handle a key press.
    ///
    /// Returns true if the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.state.prompt.is_some() {
            self.handle_prompt_key(code);
            return false;
        }

        if self.state.current_view == View::Chat && self.state.chat.input_focused {
            self.handle_chat_input_key(code);
            return false;
        }

        match code {
            KeyCode::Char('q') => {
                return true;
            }

            // View switching with number keys
            KeyCode::Char('1') => self.switch_view(View::Scripts),
            KeyCode::Char('2') => self.switch_view(View::Roles),
            KeyCode::Char('3') => self.switch_view(View::Chat),

            KeyCode::Tab => self.switch_view(self.state.current_view.next()),
            KeyCode::BackTab => self.switch_view(self.state.current_view.prev()),

            _ => match self.state.current_view {
                View::Scripts => self.handle_scripts_key(code),
                View::Roles => self.handle_roles_key(code),
                View::Chat => self.handle_chat_key(code),
            },
        }
        false
    }

    fn handle_scripts_key(&mut self, code: KeyCode) {
        let len = self.store.store().scripts().len();
        match code {
            KeyCode::Up | KeyCode::Char('k') => step(&mut self.state.script_index, len, false),
            KeyCode::Down | KeyCode::Char('j') => step(&mut self.state.script_index, len, true),
            KeyCode::Enter => self.toggle_selected_script(),
            KeyCode::Char('u') => self.state.open_prompt(Prompt::UploadPath, ""),
            KeyCode::Char('a') => {
                if let Some(script) = self.store.store().scripts().get(self.state.script_index) {
                    let id = script.id.clone();
                    self.state.notify(format!("Analyzing {id}..."));
                    self.start_request(BackendCommand::AnalyzeScript(id));
                }
            }
            _ => {}
        }
    }

    fn handle_roles_key(&mut self, code: KeyCode) {
        let len = self.selected_roles().len();
        match code {
            KeyCode::Up | KeyCode::Char('k') => step(&mut self.state.role_index, len, false),
            KeyCode::Down | KeyCode::Char('j') => step(&mut self.state.role_index, len, true),
            KeyCode::Char('n') => self.edit_role_field(RoleField::Name),
            KeyCode::Char('c') => self.edit_role_field(RoleField::Character),
            KeyCode::Char('h') => self.edit_role_field(RoleField::LanguageHabit),
            // Talk to the highlighted role.
            KeyCode::Enter => {
                if let Some(role) = self.selected_roles().get(self.state.role_index) {
                    let assistant = role.id.clone();
                    let user = self
                        .state
                        .chat
                        .user
                        .clone()
                        .filter(|user| user != &assistant);
                    self.open_chat(user, assistant);
                    self.state.current_view = View::Chat;
                }
            }
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, code: KeyCode) {
        let Some(assistant) = self.state.chat.assistant.clone() else {
            return;
        };

        match code {
            KeyCode::Char('i') | KeyCode::Enter => {
                self.state.chat.input_focused = true;
            }
            KeyCode::Char('s') | KeyCode::Esc => {
                if self.state.chat.snapshot.receiving {
                    self.send(BackendCommand::StopChat);
                }
            }
            KeyCode::Char('a') => {
                if let Some(next) = cycle_role(self.selected_roles(), Some(&assistant)) {
                    if next != assistant {
                        let user = self.state.chat.user.clone();
                        self.open_chat(user, next);
                    }
                }
            }
            KeyCode::Char('m') => {
                let user = match self.state.chat.user {
                    Some(_) => None,
                    None => {
                        let roles = self.selected_roles();
                        roles
                            .iter()
                            .find(|r| r.id != assistant)
                            .or_else(|| roles.first())
                            .map(|r| r.id.clone())
                    }
                };
                self.open_chat(user, assistant);
            }
            KeyCode::Char('u') => {
                if let Some(current) = self.state.chat.user.clone() {
                    if let Some(next) = cycle_role(self.selected_roles(), Some(&current)) {
                        if next != current {
                            self.open_chat(Some(next), assistant);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_chat_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.state.chat.input_focused = false;
            }
            KeyCode::Enter => {
                if self.state.chat.input.value().trim().is_empty() {
                    return;
                }
                let content = self.state.chat.input.take();
                self.send(BackendCommand::SendMessage(content));
            }
            code => edit_input(&mut self.state.chat.input, code),
        }
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.state.close_prompt(),
            KeyCode::Enter => self.submit_prompt(),
            code => edit_input(&mut self.state.prompt_input, code),
        }
    }
}

/// Line-editing keys shared by every text input.
fn edit_input(input: &mut TextInput, code: KeyCode) {
    match code {
        KeyCode::Char(c) => input.insert(c),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use scriptchat_core::{Script, ScriptId};
    use tempfile::TempDir;

    use super::*;
    use crate::event::ConversationSnapshot;

    struct Harness {
        app: App,
        cmd_rx: mpsc::Receiver<BackendCommand>,
        dir: TempDir,
        _ui_tx: mpsc::Sender<UiEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = PersistentStore::load(dir.path().join("script-storage.json")).unwrap();
            let (ui_tx, ui_rx) = mpsc::channel(16);
            let (cmd_tx, cmd_rx) = mpsc::channel(16);
            Self {
                app: App::new(store, ui_rx, cmd_tx),
                cmd_rx,
                dir,
                _ui_tx: ui_tx,
            }
        }

        fn with_selected_script() -> Self {
            let mut h = Self::new();
            let script = Script::new(ScriptId::new("s1"), "Hamlet", "...").with_roles(vec![
                Role::new("hamlet", "Hamlet", "brooding", "verse"),
                Role::new("ophelia", "Ophelia", "gentle", "song"),
            ]);
            h.app.store.mutate(|s| s.add_script(script)).unwrap();
            h.app
                .store
                .mutate(|s| s.select_script(Some(&ScriptId::new("s1"))))
                .unwrap();
            h
        }

        fn reload(&self) -> PersistentStore {
            PersistentStore::load(self.dir.path().join("script-storage.json")).unwrap()
        }

        fn commands(&mut self) -> Vec<BackendCommand> {
            let mut cmds = Vec::new();
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                cmds.push(cmd);
            }
            cmds
        }
    }

    #[test]
    fn test_upload_success_is_persisted() {
        let mut h = Harness::new();
        h.app.state.pending_requests = 1;

        let script = Script::new(ScriptId::new("s9"), "Macbeth", "...");
        h.app.apply_event(UiEvent::ScriptUploaded(Ok(script)));

        assert_eq!(h.app.state.pending_requests, 0);
        assert!(h.reload().store().script(&ScriptId::new("s9")).is_some());
    }

    #[test]
    fn test_failed_analysis_leaves_store_unchanged() {
        let mut h = Harness::with_selected_script();
        h.app.state.pending_requests = 1;

        h.app.apply_event(UiEvent::RolesAnalyzed {
            script_id: ScriptId::new("s1"),
            result: Err("script not found (code 3)".into()),
        });

        assert_eq!(h.app.state.pending_requests, 0);
        assert_eq!(h.reload().store().script_roles(&ScriptId::new("s1")).len(), 2);
        let message = h.app.state.active_notification().map(|n| n.message.clone());
        assert_eq!(
            message.as_deref(),
            Some("Analysis failed: script not found (code 3)")
        );
    }

    #[test]
    fn test_role_update_applies_patch_on_success() {
        let mut h = Harness::with_selected_script();

        h.app.apply_event(UiEvent::RoleUpdated {
            script_id: ScriptId::new("s1"),
            role_id: RoleId::new("ophelia"),
            patch: RoleField::Character.patch("defiant".into()),
            result: Ok(()),
        });

        let store = h.reload();
        let role = store
            .store()
            .script(&ScriptId::new("s1"))
            .and_then(|s| s.role(&RoleId::new("ophelia")))
            .cloned();
        assert_eq!(role.map(|r| r.character).as_deref(), Some("defiant"));
    }

    #[test]
    fn test_entering_chat_opens_guest_conversation() {
        let mut h = Harness::with_selected_script();
        h.app.handle_key(KeyCode::Char('3'));

        let cmds = h.commands();
        assert!(matches!(
            cmds.as_slice(),
            [BackendCommand::OpenChat { user: None, assistant, .. }] if assistant.as_str() == "hamlet"
        ));
    }

    #[test]
    fn test_switching_participants_drops_stale_snapshots() {
        let mut h = Harness::with_selected_script();
        h.app.handle_key(KeyCode::Char('3'));
        let first = h.app.state.chat.epoch;

        h.app.handle_key(KeyCode::Char('a'));
        assert_eq!(
            h.app.state.chat.assistant.as_ref().map(RoleId::as_str),
            Some("ophelia")
        );

        h.app.apply_event(UiEvent::Conversation {
            epoch: first,
            snapshot: ConversationSnapshot {
                streaming: "stale".into(),
                receiving: true,
                ..ConversationSnapshot::default()
            },
        });
        assert!(h.app.state.chat.snapshot.streaming.is_empty());
        assert!(!h.app.state.chat.snapshot.receiving);
    }

    #[test]
    fn test_changing_selection_closes_chat() {
        let mut h = Harness::with_selected_script();
        h.app.handle_key(KeyCode::Char('3'));
        h.commands();

        h.app.handle_key(KeyCode::Char('1'));
        h.app.handle_key(KeyCode::Enter);

        assert!(h.reload().store().selected_id().is_none());
        assert!(!h.app.state.chat.is_open());
        assert!(matches!(h.commands().as_slice(), [BackendCommand::CloseChat]));
    }

    #[test]
    fn test_chat_input_sends_trimmed_message() {
        let mut h = Harness::with_selected_script();
        h.app.handle_key(KeyCode::Char('3'));
        h.app.handle_key(KeyCode::Char('i'));
        h.commands();

        h.app.handle_key(KeyCode::Enter);
        assert!(h.commands().is_empty());

        for c in "to be".chars() {
            h.app.handle_key(KeyCode::Char(c));
        }
        h.app.handle_key(KeyCode::Enter);

        assert!(matches!(
            h.commands().as_slice(),
            [BackendCommand::SendMessage(text)] if text == "to be"
        ));
        assert!(h.app.state.chat.input.is_empty());
    }

    #[test]
    fn test_quit_key_only_outside_inputs() {
        let mut h = Harness::with_selected_script();
        h.app.handle_key(KeyCode::Char('3'));
        h.app.handle_key(KeyCode::Char('i'));
        assert!(!h.app.handle_key(KeyCode::Char('q')));
        assert_eq!(h.app.state.chat.input.value(), "q");

        h.app.handle_key(KeyCode::Esc);
        assert!(h.app.handle_key(KeyCode::Char('q')));
    }
}
