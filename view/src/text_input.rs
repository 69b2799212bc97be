use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// State for a single-line text field.
///
/// `max_len` limits the number of characters; longer text is truncated,
/// the way a fixed-size patch name slot on the device truncates it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextInputState {
    pub value: String,
    pub cursor: usize,
    pub max_len: Option<usize>,
}

impl TextInputState {
    pub fn new(initial: &str) -> Self {
        Self {
            value: initial.to_string(),
            cursor: initial.len(),
            max_len: None,
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        let text = self.value.clone();
        self.set_text(&text);
        self
    }

    /// Replace the whole text, moving the cursor to the end. Returns true if
    /// the stored text changed.
    pub fn set_text(&mut self, text: &str) -> bool {
        let text: String = match self.max_len {
            Some(max) => text.chars().take(max).collect(),
            None => text.to_string(),
        };
        let changed = text != self.value;
        self.value = text;
        self.cursor = self.value.len();
        changed
    }

    fn is_full(&self) -> bool {
        self.max_len
            .is_some_and(|max| self.value.chars().count() >= max)
    }

    pub fn insert(&mut self, ch: char) -> bool {
        if self.is_full() {
            return false;
        }
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = self.value[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.value.remove(prev);
        self.cursor = prev;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.value.len() {
            return false;
        }
        self.value.remove(self.cursor);
        true
    }

    pub fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = self.value[..self.cursor]
                .char_indices()
                .next_back()
                .map(|(i, _)| i)
                .unwrap_or(0);
        }
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.value.len() {
            self.cursor += self.value[self.cursor..]
                .chars()
                .next()
                .map_or(0, |c| c.len_utf8());
        }
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.len();
    }
}

/// Single-line text field widget.
///
/// The cursor (reverse-video block) is only drawn while the field has focus.
pub struct TextInput<'a> {
    state: &'a TextInputState,
    focused: bool,
    style: Style,
    cursor_style: Style,
}

impl<'a> TextInput<'a> {
    pub fn new(state: &'a TextInputState) -> Self {
        Self {
            state,
            focused: false,
            style: Style::default(),
            cursor_style: Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD),
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }
}

impl Widget for TextInput<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let y = area.y;
        let mut x = area.x;

        for (i, ch) in self.state.value.char_indices() {
            if x >= area.right() {
                break;
            }
            let style = if self.focused && i == self.state.cursor {
                self.cursor_style
            } else {
                self.style
            };
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.set_char(ch);
                cell.set_style(style);
            }
            x += 1;
        }

        if self.focused
            && self.state.cursor >= self.state.value.len()
            && x < area.right()
            && let Some(cell) = buf.cell_mut((x, y))
        {
            cell.set_char(' ');
            cell.set_style(self.cursor_style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_text_truncates_to_max_len() {
        let mut state = TextInputState::new("").with_max_len(4);
        assert!(state.set_text("Init Patch"));
        assert_eq!(state.value, "Init");
        assert_eq!(state.cursor, 4);
        assert!(!state.set_text("Init"));
    }

    #[test]
    fn insert_stops_at_max_len() {
        let mut state = TextInputState::new("ab").with_max_len(3);
        assert!(state.insert('c'));
        assert!(!state.insert('d'));
        assert_eq!(state.value, "abc");
    }

    #[test]
    fn editing_handles_multibyte_chars() {
        let mut state = TextInputState::new("aé");
        assert!(state.backspace());
        assert_eq!(state.value, "a");
        state.home();
        assert!(state.delete());
        assert!(!state.delete());
        assert_eq!(state.value, "");
    }
}
