//! Colours and styles.

use ratatui::style::{Color, Modifier, Style};

use scriptchat_core::ChatRole;

use crate::state::NotificationLevel;

/// Palette for the ScriptChat screens.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Borders of the pane that has focus, tab highlight.
    pub frame: Color,
    /// Hints, ids, placeholders and unfocused borders.
    pub hint: Color,
    /// Selected-script marker, progress and info notifications.
    pub good: Color,
    pub bad: Color,
    /// Background of the row under the cursor.
    pub cursor: Color,
    /// Speaker colours in the conversation.
    pub user: Color,
    pub role: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            frame: Color::Cyan,
            hint: Color::DarkGray,
            good: Color::Green,
            bad: Color::Red,
            cursor: Color::DarkGray,
            user: Color::Cyan,
            role: Color::Magenta,
        }
    }
}

impl Theme {
    pub fn border(&self, focused: bool) -> Style {
        Style::default().fg(if focused { self.frame } else { self.hint })
    }

    pub fn hint(&self) -> Style {
        Style::default().fg(self.hint)
    }

    pub fn good(&self) -> Style {
        Style::default().fg(self.good)
    }

    pub fn heading(&self) -> Style {
        Style::default().add_modifier(Modifier::BOLD)
    }

    pub fn cursor_row(&self) -> Style {
        Style::default().bg(self.cursor)
    }

    /// Colour of a speaker's name and text.
    pub fn speaker(&self, role: ChatRole) -> Style {
        match role {
            ChatRole::User => Style::default().fg(self.user),
            ChatRole::Assistant => Style::default().fg(self.role),
        }
    }

    pub fn notification(&self, level: NotificationLevel) -> Style {
        match level {
            NotificationLevel::Info => self.good(),
            NotificationLevel::Error => Style::default().fg(self.bad).add_modifier(Modifier::BOLD),
        }
    }
}
