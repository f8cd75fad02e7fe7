//! Text measuring and layout helpers.

use ratatui::layout::Rect;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Word-wrap `text` to `width` terminal columns, prefixing every line with
/// `indent`. Words wider than a line are split; runs of spaces collapse.
pub fn wrap_lines(text: &str, width: usize, indent: &str) -> Vec<String> {
    let room = width.saturating_sub(indent.width());
    if room == 0 {
        return vec![format!("{indent}{text}")];
    }

    let mut out = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        let mut used = 0;

        for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
            let word_width = word.width();
            if used > 0 && used + 1 + word_width > room {
                out.push(format!("{indent}{line}"));
                line.clear();
                used = 0;
            }

            if word_width > room {
                for ch in word.chars() {
                    let ch_width = ch.width().unwrap_or(0);
                    if used > 0 && used + ch_width > room {
                        out.push(format!("{indent}{line}"));
                        line.clear();
                        used = 0;
                    }
                    line.push(ch);
                    used += ch_width;
                }
                continue;
            }

            if used > 0 {
                line.push(' ');
                used += 1;
            }
            line.push_str(word);
            used += word_width;
        }

        out.push(format!("{indent}{line}"));
    }

    if out.is_empty() {
        out.push(indent.to_string());
    }
    out
}

/// Shorten `text` to at most `max_width` columns, ending in `...` when cut.
pub fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width < 3 {
        return text.chars().take(max_width).collect();
    }

    let budget = max_width - 3;
    let mut used = 0;
    let mut out: String = text
        .chars()
        .take_while(|ch| {
            used += ch.width().unwrap_or(0);
            used <= budget
        })
        .collect();
    out.push_str("...");
    out
}

/// A `width` x `height` box centred in `area`, clamped to fit.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_breaks_between_words() {
        let wrapped = wrap_lines("to be or not to be", 10, "  ");
        assert_eq!(wrapped, vec!["  to be or", "  not to", "  be"]);
    }

    #[test]
    fn test_wrap_measures_columns() {
        assert_eq!(wrap_lines("ééé ééé", 5, ""), vec!["ééé", "ééé"]);
        // Each CJK char takes two columns.
        assert_eq!(wrap_lines("你好世界", 5, ""), vec!["你好", "世界"]);
    }

    #[test]
    fn test_wrap_keeps_blank_lines() {
        let wrapped = wrap_lines("a\n\nb", 10, "> ");
        assert_eq!(wrapped, vec!["> a", "> ", "> b"]);
        assert_eq!(wrap_lines("", 10, "> "), vec!["> "]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello world", 8), "Hello...");
        assert_eq!(truncate("Hi", 10), "Hi");
        assert_eq!(truncate("Exactly", 7), "Exactly");
        assert_eq!(truncate("Hello", 2), "He");
    }

    #[test]
    fn test_centered_rect_fits_area() {
        let area = Rect::new(0, 0, 40, 10);
        assert_eq!(centered_rect(20, 4, area), Rect::new(10, 3, 20, 4));
        assert_eq!(centered_rect(80, 20, area), Rect::new(0, 0, 40, 10));
    }
}
