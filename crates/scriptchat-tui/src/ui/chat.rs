//! Chat widget for displaying a conversation.

use ratatui::layout::Rect;
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use scriptchat_core::{ChatRole, HistoryItem};

use super::theme::Theme;
use super::utils::wrap_lines;

/// Conversation pane. Always scrolled to the newest line.
#[derive(Debug, Clone)]
pub struct ChatWidget<'a> {
    /// Display items; while a reply streams, the last one is that reply.
    messages: &'a [HistoryItem],
    /// Whether a reply is in flight.
    receiving: bool,
    /// In flight but no text yet.
    waiting: bool,
    user_label: &'a str,
    assistant_label: &'a str,
    focused: bool,
    theme: Theme,
}

impl<'a> ChatWidget<'a> {
    pub fn new(messages: &'a [HistoryItem]) -> Self {
        Self {
            messages,
            receiving: false,
            waiting: false,
            user_label: "You",
            assistant_label: "Assistant",
            focused: false,
            theme: Theme::default(),
        }
    }

    /// Mark a reply as in flight. `waiting` means no text has arrived yet.
    pub fn receiving(mut self, receiving: bool, waiting: bool) -> Self {
        self.receiving = receiving;
        self.waiting = receiving && waiting;
        self
    }

    /// Names shown in front of each message.
    pub fn labels(mut self, user: &'a str, assistant: &'a str) -> Self {
        self.user_label = user;
        self.assistant_label = assistant;
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn render(self, frame: &mut Frame, area: Rect) {
        let border_style = self.theme.border(self.focused);

        let visible_height = area.height.saturating_sub(2) as usize;
        let text_width = area.width.saturating_sub(2) as usize;

        let mut all_lines: Vec<Line> = Vec::new();

        for msg in self.messages {
            let label = match msg.role {
                ChatRole::User => self.user_label,
                ChatRole::Assistant => self.assistant_label,
            };
            let style = self.theme.speaker(msg.role);

            all_lines.push(Line::from(Span::styled(
                format!("{label}:"),
                style.add_modifier(Modifier::BOLD),
            )));
            for wrapped_line in wrap_lines(&msg.content, text_width, "  ") {
                all_lines.push(Line::from(Span::raw(wrapped_line)));
            }
            all_lines.push(Line::from(""));
        }

        if self.waiting {
            all_lines.push(Line::from(vec![
                Span::styled(
                    format!("{}: ", self.assistant_label),
                    self.theme.speaker(ChatRole::Assistant).add_modifier(Modifier::BOLD),
                ),
                Span::styled("(waiting...)", self.theme.hint()),
            ]));
        } else if self.receiving {
            // The streamed reply is the last item; mark it as unfinished.
            all_lines.pop();
            all_lines.push(Line::from(Span::styled("  (streaming...)", self.theme.hint())));
        }

        let total_lines = all_lines.len();
        let scroll_offset = total_lines.saturating_sub(visible_height);

        let lines: Vec<Line> = all_lines
            .into_iter()
            .skip(scroll_offset)
            .take(visible_height)
            .collect();

        let settled = self
            .messages
            .len()
            .saturating_sub(usize::from(self.receiving && !self.waiting));
        let title = format!(" {} [{} messages] ", self.assistant_label, settled);

        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(title),
        );

        frame.render_widget(paragraph, area);
    }
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::*;

    fn draw(widget: ChatWidget) -> String {
        let mut terminal = Terminal::new(TestBackend::new(40, 12)).unwrap();
        terminal
            .draw(|frame| {
                let area = frame.area();
                widget.render(frame, area);
            })
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_streamed_reply_is_marked_unfinished() {
        let items = vec![HistoryItem::user("hi"), HistoryItem::assistant("partial")];
        let screen = draw(ChatWidget::new(&items).receiving(true, false));

        assert!(screen.contains("partial"));
        assert!(screen.contains("(streaming...)"));
        assert!(screen.contains("[1 messages]"));
    }

    #[test]
    fn test_waiting_for_first_delta() {
        let items = vec![HistoryItem::user("hi")];
        let screen = draw(ChatWidget::new(&items).receiving(true, true));

        assert!(screen.contains("(waiting...)"));
        assert!(!screen.contains("(streaming...)"));
        assert!(screen.contains("[1 messages]"));
    }

    #[test]
    fn test_idle_conversation_has_no_marker() {
        let items = vec![HistoryItem::user("hi"), HistoryItem::assistant("done")];
        let screen = draw(ChatWidget::new(&items));

        assert!(screen.contains("done"));
        assert!(!screen.contains("(waiting...)"));
        assert!(!screen.contains("(streaming...)"));
        assert!(screen.contains("[2 messages]"));
    }
}
