use crossterm::event::{KeyCode, KeyModifiers};
use view::{Capability, ControlId, ControlTree, center};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    MoveFocus(Direction),
    Step { forward: bool, page: bool },
}

/// Map a key to a navigation action. Arrows move focus; `+`/`-` and
/// PageUp/PageDown step the focused range or choice, Shift making it a page
/// step.
pub fn navigation(
    code: KeyCode,
    modifiers: KeyModifiers,
    focused: Option<Capability>,
) -> Option<NavAction> {
    if modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
        return None;
    }
    let page = modifiers.contains(KeyModifiers::SHIFT);
    let steppable = matches!(focused, Some(Capability::Range | Capability::Choice));
    let action = match code {
        KeyCode::Left => NavAction::MoveFocus(Direction::Left),
        KeyCode::Right => NavAction::MoveFocus(Direction::Right),
        KeyCode::Up => NavAction::MoveFocus(Direction::Up),
        KeyCode::Down => NavAction::MoveFocus(Direction::Down),
        KeyCode::PageUp | KeyCode::Char('+') if steppable => NavAction::Step {
            forward: true,
            page,
        },
        KeyCode::PageDown | KeyCode::Char('-') if steppable => NavAction::Step {
            forward: false,
            page,
        },
        _ => return None,
    };
    Some(action)
}

/// Move focus to the nearest shown control in `direction`, measured between
/// centers with off-axis distance weighted double. With nothing focused the
/// first control in the focus chain takes focus.
pub fn move_focus(tree: &mut ControlTree, direction: Direction) -> bool {
    let chain = tree.focus_chain();
    let Some(current) = tree.focused().filter(|id| chain.contains(id)) else {
        return chain.first().is_some_and(|&first| tree.set_focus(first));
    };
    let Some(from) = center_of(tree, current) else {
        return false;
    };
    let best = chain
        .iter()
        .filter(|&&id| id != current)
        .filter_map(|&id| {
            let (x, y) = center_of(tree, id)?;
            let (dx, dy) = (x - from.0, y - from.1);
            let (along, across) = match direction {
                Direction::Left => (-dx, dy),
                Direction::Right => (dx, dy),
                Direction::Up => (-dy, dx),
                Direction::Down => (dy, dx),
            };
            (along > 0).then_some((along + 2 * across.abs(), id))
        })
        .min_by_key(|&(score, _)| score);
    match best {
        Some((_, id)) => tree.set_focus(id),
        None => false,
    }
}

fn center_of(tree: &ControlTree, id: ControlId) -> Option<(i32, i32)> {
    tree.get(id).map(|c| center(c.bounds))
}

#[cfg(test)]
mod tests {
    use ratatui::layout::Rect;
    use view::{Control, ControlKind, RangeState};

    use super::*;

    #[test]
    fn arrows_always_move_focus() {
        assert_eq!(
            navigation(KeyCode::Left, KeyModifiers::NONE, None),
            Some(NavAction::MoveFocus(Direction::Left))
        );
        assert_eq!(
            navigation(KeyCode::Down, KeyModifiers::NONE, Some(Capability::Text)),
            Some(NavAction::MoveFocus(Direction::Down))
        );
    }

    #[test]
    fn stepping_needs_a_steppable_focus() {
        assert_eq!(
            navigation(KeyCode::PageUp, KeyModifiers::NONE, Some(Capability::Range)),
            Some(NavAction::Step { forward: true, page: false })
        );
        assert_eq!(
            navigation(KeyCode::Char('-'), KeyModifiers::SHIFT, Some(Capability::Choice)),
            Some(NavAction::Step { forward: false, page: true })
        );
        assert_eq!(
            navigation(KeyCode::Char('+'), KeyModifiers::NONE, Some(Capability::Toggle)),
            None
        );
        assert_eq!(navigation(KeyCode::PageDown, KeyModifiers::NONE, None), None);
        assert_eq!(
            navigation(KeyCode::Char('s'), KeyModifiers::NONE, Some(Capability::Range)),
            None
        );
    }

    #[test]
    fn control_chords_are_not_navigation() {
        assert_eq!(navigation(KeyCode::Left, KeyModifiers::CONTROL, None), None);
    }

    #[test]
    fn focus_moves_to_the_nearest_control_in_direction() {
        let window = Control::new(ControlKind::Container, Rect::new(0, 0, 80, 24));
        let mut tree = ControlTree::new(window);
        let root = tree.root();
        let knob = |x: u16, y: u16| {
            Control::new(ControlKind::Range(RangeState::new(0, 127)), Rect::new(x, y, 4, 2))
        };
        let a = tree.add(root, knob(0, 0)).unwrap();
        let b = tree.add(root, knob(10, 0)).unwrap();
        let c = tree.add(root, knob(30, 0)).unwrap();
        let d = tree.add(root, knob(10, 8)).unwrap();
        let hidden = tree.add(root, knob(5, 0).hidden()).unwrap();

        assert!(move_focus(&mut tree, Direction::Right));
        assert_eq!(tree.focused(), Some(a));
        assert!(move_focus(&mut tree, Direction::Right));
        assert_eq!(tree.focused(), Some(b));
        assert!(move_focus(&mut tree, Direction::Right));
        assert_eq!(tree.focused(), Some(c));
        assert!(!move_focus(&mut tree, Direction::Right));
        assert!(!move_focus(&mut tree, Direction::Up));
        tree.set_focus(b);
        assert!(move_focus(&mut tree, Direction::Down));
        assert_eq!(tree.focused(), Some(d));
        assert!(move_focus(&mut tree, Direction::Left));
        assert_eq!(tree.focused(), Some(a));
        assert_ne!(tree.focused(), Some(hidden));
    }
}
