//! Background task that talks to the ScriptChat backend.
//!
//! Owns the HTTP client and the open conversation. REST calls run as spawned
//! tasks so a running reply keeps streaming while they are in flight.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use scriptchat_client::{Conversation, ConversationUpdate, HttpClient, UploadData};
use scriptchat_core::Role;

use crate::event::{BackendCommand, ConversationSnapshot, UiEvent};

/// The open conversation and the participant epoch it belongs to.
struct ChatSession {
    epoch: u64,
    conversation: Conversation,
}

impl ChatSession {
    fn snapshot(&self) -> UiEvent {
        UiEvent::Conversation {
            epoch: self.epoch,
            snapshot: ConversationSnapshot::capture(&self.conversation),
        }
    }
}

/// Run the backend loop until `Quit` arrives or the UI goes away.
///
/// Dropping the session on exit cancels any running stream.
pub async fn run_backend(
    client: HttpClient,
    ui_tx: mpsc::Sender<UiEvent>,
    mut cmd_rx: mpsc::Receiver<BackendCommand>,
) {
    info!(base_url = %client.base_url(), "Backend started");

    let mut session: Option<ChatSession> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                if !handle_command(cmd, &client, &mut session, &ui_tx).await {
                    info!("Received quit command, shutting down backend");
                    break;
                }
            }

            update = next_update(&mut session) => {
                if let Some(active) = &session {
                    let _ = ui_tx.send(active.snapshot()).await;
                    if let ConversationUpdate::Failed(message) = update {
                        let _ = ui_tx
                            .send(UiEvent::ChatFailed { epoch: active.epoch, message })
                            .await;
                    }
                }
            }
        }
    }

    info!("Backend shutdown complete");
}

/// Next update of the running stream; pends forever when nothing is streaming.
async fn next_update(session: &mut Option<ChatSession>) -> ConversationUpdate {
    if let Some(active) = session {
        if active.conversation.active_stream().is_some() {
            if let Some(update) = active.conversation.next_update().await {
                return update;
            }
        }
    }
    std::future::pending().await
}

/// Returns false when the backend should stop.
async fn handle_command(
    cmd: BackendCommand,
    client: &HttpClient,
    session: &mut Option<ChatSession>,
    ui_tx: &mpsc::Sender<UiEvent>,
) -> bool {
    match cmd {
        BackendCommand::UploadScript { path, title } => {
            let client = client.clone();
            let ui_tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = client
                    .upload_script_file(&path, title.as_deref())
                    .await
                    .into_result()
                    .map(UploadData::into_script)
                    .map_err(|e| e.to_string());
                let _ = ui_tx.send(UiEvent::ScriptUploaded(result)).await;
            });
        }

        BackendCommand::AnalyzeScript(script_id) => {
            let client = client.clone();
            let ui_tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = client
                    .analyze_script(&script_id)
                    .await
                    .into_result()
                    .map(|data| data.roles.into_iter().map(Role::from).collect())
                    .map_err(|e| e.to_string());
                let _ = ui_tx
                    .send(UiEvent::RolesAnalyzed { script_id, result })
                    .await;
            });
        }

        BackendCommand::UpdateRole {
            script_id,
            role,
            patch,
        } => {
            let client = client.clone();
            let ui_tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = client
                    .modify_role(&role)
                    .await
                    .check()
                    .map_err(|e| e.to_string());
                let _ = ui_tx
                    .send(UiEvent::RoleUpdated {
                        script_id,
                        role_id: role.id,
                        patch,
                        result,
                    })
                    .await;
            });
        }

        BackendCommand::OpenChat {
            epoch,
            user,
            assistant,
        } => {
            debug!(epoch, assistant = %assistant, "Opening chat");
            let next = match session.take() {
                Some(mut active) => {
                    active.conversation.switch_participants(user, assistant);
                    active.epoch = epoch;
                    active
                }
                None => ChatSession {
                    epoch,
                    conversation: Conversation::new(user, assistant),
                },
            };
            let active = session.insert(next);
            let _ = ui_tx.send(active.snapshot()).await;

            if let Err(e) = active.conversation.load_history(client).await {
                warn!(epoch, error = %e, "Failed to load chat history");
                let _ = ui_tx
                    .send(UiEvent::ChatFailed {
                        epoch,
                        message: format!("Failed to load history: {e}"),
                    })
                    .await;
            }
            let _ = ui_tx.send(active.snapshot()).await;
        }

        BackendCommand::SendMessage(content) => match session {
            Some(active) => {
                if let Err(e) = active.conversation.send(&content, client) {
                    let _ = ui_tx
                        .send(UiEvent::ChatFailed {
                            epoch: active.epoch,
                            message: e.to_string(),
                        })
                        .await;
                }
                let _ = ui_tx.send(active.snapshot()).await;
            }
            None => warn!("Message dropped: no chat open"),
        },

        BackendCommand::StopChat => {
            if let Some(active) = session {
                if active.conversation.stop() {
                    let _ = ui_tx.send(active.snapshot()).await;
                }
            }
        }

        BackendCommand::CloseChat => {
            if session.take().is_some() {
                debug!("Chat closed");
            }
        }

        BackendCommand::Quit => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use scriptchat_core::RoleId;

    use super::*;

    /// Nothing listens on port 1, so connections are refused immediately.
    const UNREACHABLE: &str = "http://127.0.0.1:1/api/v1";

    #[tokio::test]
    async fn test_open_chat_reports_history_failure() {
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let backend = tokio::spawn(run_backend(HttpClient::new(UNREACHABLE), ui_tx, cmd_rx));

        cmd_tx
            .send(BackendCommand::OpenChat {
                epoch: 7,
                user: None,
                assistant: RoleId::new("hamlet"),
            })
            .await
            .unwrap();

        match ui_rx.recv().await {
            Some(UiEvent::Conversation { epoch, snapshot }) => {
                assert_eq!(epoch, 7);
                assert!(snapshot.items.is_empty());
                assert!(!snapshot.receiving);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match ui_rx.recv().await {
            Some(UiEvent::ChatFailed { epoch, message }) => {
                assert_eq!(epoch, 7);
                assert!(message.starts_with("Failed to load history"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        cmd_tx.send(BackendCommand::Quit).await.unwrap();
        backend.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_without_chat_is_ignored() {
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let backend = tokio::spawn(run_backend(HttpClient::new(UNREACHABLE), ui_tx, cmd_rx));

        cmd_tx
            .send(BackendCommand::SendMessage("hello".into()))
            .await
            .unwrap();
        cmd_tx.send(BackendCommand::Quit).await.unwrap();
        backend.await.unwrap();

        assert!(ui_rx.recv().await.is_none());
    }
}
