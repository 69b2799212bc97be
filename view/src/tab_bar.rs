use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

pub const TAB_SEP: &str = " │ ";

/// Page tabs of a notebook control, rendered as a single row.
///
/// The active page is highlighted; when the notebook itself has input focus
/// the active label is underlined as well.
pub struct TabBar<'a> {
    labels: &'a [String],
    active: usize,
    focused: bool,
    style: Style,
    active_style: Style,
}

impl<'a> TabBar<'a> {
    pub fn new(labels: &'a [String], active: usize) -> Self {
        Self {
            labels,
            active,
            focused: false,
            style: Style::default().fg(Color::DarkGray),
            active_style: Style::default()
                .fg(Color::White)
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

    /// Hit-test: which page label is at (x, y) for a bar rendered into `area`.
    pub fn tab_at(x: u16, y: u16, area: Rect, labels: &[String]) -> Option<usize> {
        if y != area.y || x < area.x || x >= area.right() {
            return None;
        }
        let rel_x = (x - area.x) as usize;
        let sep_len = TAB_SEP.chars().count();
        let mut pos = 0;
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                pos += sep_len;
            }
            let len = label.chars().count();
            if rel_x >= pos && rel_x < pos + len {
                return Some(i);
            }
            pos += len;
        }
        None
    }
}

impl Widget for TabBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let mut x = area.x;
        let y = area.y;
        let mut put = |x: &mut u16, ch: char, style: Style| {
            if *x >= area.right() {
                return;
            }
            if let Some(cell) = buf.cell_mut((*x, y)) {
                cell.set_char(ch);
                cell.set_style(style);
            }
            *x += 1;
        };

        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                for ch in TAB_SEP.chars() {
                    put(&mut x, ch, self.style);
                }
            }
            let style = match (i == self.active, self.focused) {
                (true, true) => self.active_style.add_modifier(Modifier::UNDERLINED),
                (true, false) => self.active_style,
                _ => self.style,
            };
            for ch in label.chars() {
                put(&mut x, ch, style);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_at_skips_separators() {
        let labels = vec!["Osc".to_string(), "LFO".to_string()];
        let area = Rect::new(4, 2, 40, 1);
        assert_eq!(TabBar::tab_at(4, 2, area, &labels), Some(0));
        assert_eq!(TabBar::tab_at(7, 2, area, &labels), None);
        assert_eq!(TabBar::tab_at(10, 2, area, &labels), Some(1));
        assert_eq!(TabBar::tab_at(10, 3, area, &labels), None);
    }

    #[test]
    fn renders_labels_in_order() {
        let labels = vec!["A".to_string(), "B".to_string()];
        let area = Rect::new(0, 0, 10, 1);
        let mut buf = Buffer::empty(area);
        TabBar::new(&labels, 1).render(area, &mut buf);
        assert_eq!(buf[(0, 0)].symbol(), "A");
        assert_eq!(buf[(4, 0)].symbol(), "B");
    }
}
