//! Main render function for the TUI.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::Frame;

use scriptchat_client::ConversationMode;
use scriptchat_core::{ChatRole, Role, RoleId, ScriptStore};

use super::chat::ChatWidget;
use super::theme::Theme;
use super::utils::{centered_rect, truncate};
use crate::state::{Prompt, TextInput, UiState, View};

/// Render the entire UI.
pub fn render(frame: &mut Frame, state: &UiState, store: &ScriptStore) {
    let theme = Theme::default();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Fill(1),
        Constraint::Length(3),
    ])
    .areas(frame.area());

    render_header(frame, header_area, state, store, &theme);

    match state.current_view {
        View::Scripts => render_scripts(frame, body_area, state, store, &theme),
        View::Roles => render_roles(frame, body_area, state, store, &theme),
        View::Chat => render_chat(frame, body_area, state, store, &theme),
    }

    render_footer(frame, footer_area, state, store, &theme);

    if let Some(prompt) = &state.prompt {
        render_prompt(frame, prompt, &state.prompt_input, &theme);
    }
}

/// Render the header with navigation tabs.
fn render_header(frame: &mut Frame, area: Rect, state: &UiState, store: &ScriptStore, theme: &Theme) {
    let titles: Vec<&str> = View::all().iter().map(|v| v.name()).collect();
    let selected = View::all()
        .iter()
        .position(|v| *v == state.current_view)
        .unwrap_or(0);

    let title = match store.selected_script() {
        Some(script) => format!(" ScriptChat - {} ", truncate(&script.title, 40)),
        None => " ScriptChat ".to_string(),
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_style(theme.border(true).add_modifier(Modifier::BOLD)),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(theme.border(true).add_modifier(Modifier::BOLD))
        .divider(" | ");

    frame.render_widget(tabs, area);
}

fn render_scripts(frame: &mut Frame, area: Rect, state: &UiState, store: &ScriptStore, theme: &Theme) {
    let scripts = store.scripts();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Scripts ({}) ", scripts.len()))
        .border_style(theme.border(true));

    if scripts.is_empty() {
        let empty = Paragraph::new("No scripts yet. Press [u] to upload one.")
            .style(theme.hint())
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec![
        Cell::from(""),
        Cell::from("Title"),
        Cell::from("Roles"),
        Cell::from("Updated"),
        Cell::from("ID"),
    ])
    .style(theme.heading())
    .height(1);

    let selected = store.selected_id();
    let rows: Vec<Row> = scripts
        .iter()
        .enumerate()
        .map(|(i, script)| {
            let is_selected = Some(&script.id) == selected;
            let marker = if is_selected {
                Cell::from("*").style(theme.good())
            } else {
                Cell::from("")
            };
            let roles = if script.roles.is_empty() {
                Cell::from("-").style(theme.hint())
            } else {
                Cell::from(script.roles.len().to_string())
            };

            let style = if i == state.script_index {
                theme.cursor_row()
            } else {
                Style::default()
            };

            Row::new(vec![
                marker,
                Cell::from(truncate(&script.title, 40)),
                roles,
                Cell::from(script.updated_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::from(script.id.to_string()).style(theme.hint()),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Length(40),
            Constraint::Length(6),
            Constraint::Length(17),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(block);

    frame.render_widget(table, area);
}

fn render_roles(frame: &mut Frame, area: Rect, state: &UiState, store: &ScriptStore, theme: &Theme) {
    let Some(script) = store.selected_script() else {
        let empty = Paragraph::new("No script selected. Pick one in [1] Scripts with Enter.")
            .style(theme.hint())
            .block(Block::default().borders(Borders::ALL).title(" Roles "));
        frame.render_widget(empty, area);
        return;
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Roles of {} ({}) ", truncate(&script.title, 40), script.roles.len()))
        .border_style(theme.border(true));

    if script.roles.is_empty() {
        let empty = Paragraph::new("No roles yet. Press [a] in [1] Scripts to analyze this script.")
            .style(theme.hint())
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let [list_area, detail_area] =
        Layout::vertical([Constraint::Fill(1), Constraint::Length(7)]).areas(area);

    let header = Row::new(vec![
        Cell::from("Name"),
        Cell::from("Character"),
        Cell::from("Language habit"),
    ])
    .style(theme.heading())
    .height(1);

    let rows: Vec<Row> = script
        .roles
        .iter()
        .enumerate()
        .map(|(i, role)| {
            let style = if i == state.role_index {
                theme.cursor_row()
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(truncate(&role.name, 20)),
                Cell::from(truncate(&role.character, 40)),
                Cell::from(truncate(&role.language_habit, 40)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(40),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(block);
    frame.render_widget(table, list_area);

    if let Some(role) = script.roles.get(state.role_index) {
        render_role_detail(frame, detail_area, role, theme);
    }
}

fn render_role_detail(frame: &mut Frame, area: Rect, role: &Role, theme: &Theme) {
    let lines = vec![
        Line::from(vec![
            Span::styled("Name:       ", theme.hint()),
            Span::styled(role.name.as_str(), theme.heading()),
        ]),
        Line::from(vec![
            Span::styled("Character:  ", theme.hint()),
            Span::raw(role.character.as_str()),
        ]),
        Line::from(vec![
            Span::styled("Habit:      ", theme.hint()),
            Span::raw(role.language_habit.as_str()),
        ]),
    ];

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", role.id))
                .border_style(theme.border(false)),
        );
    frame.render_widget(detail, area);
}

fn render_chat(frame: &mut Frame, area: Rect, state: &UiState, store: &ScriptStore, theme: &Theme) {
    let chat = &state.chat;
    let Some(assistant) = &chat.assistant else {
        let hint = if store.selected_script().is_some() {
            "This script has no roles yet. Analyze it in [1] Scripts first."
        } else {
            "No script selected. Pick one in [1] Scripts with Enter."
        };
        let empty = Paragraph::new(hint)
            .style(theme.hint())
            .block(Block::default().borders(Borders::ALL).title(" Chat "));
        frame.render_widget(empty, area);
        return;
    };

    let roles = store
        .selected_script()
        .map(|s| s.roles.as_slice())
        .unwrap_or(&[]);
    let assistant_name = role_name(roles, assistant);
    let user_name = match &chat.user {
        Some(user) => role_name(roles, user),
        None => "You".to_string(),
    };

    let [participants_area, messages_area, input_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Fill(1),
        Constraint::Length(3),
    ])
    .areas(area);

    let mode = match chat.mode() {
        ConversationMode::Single => "single (guest)",
        ConversationMode::Dual => "dual",
    };
    let status = if chat.snapshot.receiving {
        Span::styled("receiving", theme.good())
    } else {
        Span::styled("idle", theme.hint())
    };
    let name_style = |role| theme.speaker(role).add_modifier(Modifier::BOLD);
    let participants = Paragraph::new(Line::from(vec![
        Span::styled("Assistant: ", theme.hint()),
        Span::styled(assistant_name.as_str(), name_style(ChatRole::Assistant)),
        Span::styled("   You: ", theme.hint()),
        Span::styled(user_name.as_str(), name_style(ChatRole::User)),
        Span::styled("   Mode: ", theme.hint()),
        Span::raw(mode),
        Span::styled("   ", theme.hint()),
        status,
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Participants "));
    frame.render_widget(participants, participants_area);

    ChatWidget::new(&chat.snapshot.items)
        .receiving(chat.snapshot.receiving, chat.snapshot.streaming.is_empty())
        .labels(&user_name, &assistant_name)
        .focused(!chat.input_focused)
        .theme(theme.clone())
        .render(frame, messages_area);

    let (text, style) = if chat.input_focused {
        (with_cursor(&chat.input), Style::default().fg(Color::White))
    } else if chat.input.is_empty() {
        ("Press [i] to type a message".to_string(), theme.hint())
    } else {
        (chat.input.value().to_string(), Style::default())
    };
    let border = theme.border(chat.input_focused);
    let input = Paragraph::new(text).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(format!(" Message as {user_name} ")),
    );
    frame.render_widget(input, input_area);
}

/// Render the footer with notification/status and keybindings.
fn render_footer(frame: &mut Frame, area: Rect, state: &UiState, store: &ScriptStore, theme: &Theme) {
    let status = match state.active_notification() {
        Some(n) => {
            Span::styled(n.message.clone(), theme.notification(n.level))
        }
        None if state.pending_requests > 0 => Span::styled(
            format!("Working... ({} pending)", state.pending_requests),
            theme.good(),
        ),
        None => Span::raw(format!("{} scripts", store.scripts().len())),
    };

    let help = if state.prompt.is_some() {
        "[Enter] Submit  [Esc] Cancel"
    } else if state.chat.input_focused && state.current_view == View::Chat {
        "[Enter] Send  [Esc] Leave input"
    } else {
        match state.current_view {
            View::Scripts => "[j/k] Navigate  [Enter] Select  [u] Upload  [a] Analyze  [Tab] Next  [q] Quit",
            View::Roles => "[j/k] Navigate  [n/c/h] Edit  [Enter] Chat  [Tab] Next  [q] Quit",
            View::Chat => "[i] Type  [a] Assistant  [m] Mode  [u] User role  [s] Stop  [q] Quit",
        }
    };

    let footer = Paragraph::new(Line::from(vec![
        status,
        Span::raw(" | "),
        Span::styled(help, theme.hint()),
    ]))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(footer, area);
}

/// Render a modal text prompt.
fn render_prompt(frame: &mut Frame, prompt: &Prompt, input: &TextInput, theme: &Theme) {
    let area = centered_rect(70, 7, frame.area());

    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", prompt.label()),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", with_cursor(input)),
            Style::default().fg(Color::White),
        )),
        Line::from(Span::styled(
            "  [Enter] Submit  [Esc] Cancel",
            theme.hint(),
        )),
    ];

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border(true))
            .title(format!(" {} ", prompt.title())),
    );

    frame.render_widget(paragraph, area);
}

/// Input text with a `|` at the cursor.
fn with_cursor(input: &TextInput) -> String {
    let before: String = input.value().chars().take(input.cursor()).collect();
    let after: String = input.value().chars().skip(input.cursor()).collect();
    format!("{before}|{after}")
}

/// Display name of a role, falling back to its id.
fn role_name(roles: &[Role], id: &RoleId) -> String {
    roles
        .iter()
        .find(|r| &r.id == id)
        .map(|r| r.name.clone())
        .unwrap_or_else(|| id.to_string())
}
