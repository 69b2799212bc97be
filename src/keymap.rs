use crossterm::event::KeyCode;
use serde::Deserialize;
use view::{ControlId, ControlKind, ControlTree};

/// One key mapping row as declared in the UI description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BindingSpec {
    /// Key name, e.g. "s", "F2" or "Page_Up".
    pub key: String,
    /// Name of the target control.
    pub param: String,
    #[serde(default)]
    pub param_arg: i32,
    /// Context container; empty or absent means the mapping applies
    /// everywhere.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub parent_arg: i32,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub key_name: String,
    pub key: KeyCode,
    pub target_name: String,
    pub target_arg: i32,
    pub context_name: Option<String>,
    pub context_arg: i32,
    target: Option<ControlId>,
    context: Option<ControlId>,
}

impl Binding {
    pub fn target(&self) -> Option<ControlId> {
        self.target
    }

    /// Unresolved bindings never match.
    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    fn matches(&self, tree: &ControlTree, key: KeyCode, focused: Option<ControlId>) -> bool {
        if self.key != key || self.target.is_none() {
            return false;
        }
        let Some(context) = self.context else {
            return true;
        };
        match tree.active_page(context) {
            Some(page) => usize::try_from(self.context_arg) == Ok(page),
            None => focused.is_some_and(|f| tree.is_ancestor(context, f)),
        }
    }
}

/// Key mappings in declaration order. Earlier rows shadow later ones.
#[derive(Debug, Default)]
pub struct KeyBindings {
    bindings: Vec<Binding>,
}

/// What a dispatched binding did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    PageSwitched { notebook: ControlId, page: usize },
    Pressed(ControlId),
    Focused(ControlId),
}

impl KeyBindings {
    pub fn load(specs: &[BindingSpec]) -> Self {
        let mut bindings = Vec::with_capacity(specs.len());
        for spec in specs {
            let Some(key) = parse_key_name(&spec.key) else {
                log::debug!("Unknown key '{}' mapped to '{}', skipping", spec.key, spec.param);
                continue;
            };
            bindings.push(Binding {
                key_name: spec.key.clone(),
                key,
                target_name: spec.param.clone(),
                target_arg: spec.param_arg,
                context_name: spec.parent.clone().filter(|p| !p.is_empty()),
                context_arg: spec.parent_arg,
                target: None,
                context: None,
            });
        }
        Self { bindings }
    }

    /// Offer `control`, declared as `name`, to every binding targeting that
    /// name. A binding whose context container does not exist stays
    /// unresolved rather than becoming unconditional.
    pub fn bind(&mut self, tree: &ControlTree, control: ControlId, name: &str) {
        for binding in self.bindings.iter_mut().filter(|b| b.target_name == name) {
            let context = match binding.context_name.as_deref() {
                None => None,
                Some(parent) => match tree.find_by_name(parent) {
                    Some(found) => Some(found),
                    None => {
                        log::warn!(
                            "Can't find parent '{parent}' for key '{}' mapped to '{name}'",
                            binding.key_name
                        );
                        continue;
                    }
                },
            };
            binding.target = Some(control);
            binding.context = context;
            log::debug!(
                "Mapped key '{}' to '{name}' arg {} (context {:?} arg {})",
                binding.key_name,
                binding.target_arg,
                binding.context_name,
                binding.context_arg
            );
        }
    }

    /// First binding for `key` whose context currently applies.
    pub fn resolve(
        &self,
        tree: &ControlTree,
        key: KeyCode,
        focused: Option<ControlId>,
    ) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.matches(tree, key, focused))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

/// Offer every named control to the bindings, by its full declared name.
pub fn bind_all(bindings: &mut KeyBindings, tree: &ControlTree) {
    for id in tree.walk() {
        if let Some(name) = tree.get(id).and_then(|c| c.name.as_deref()) {
            bindings.bind(tree, id, name);
        }
    }
    let unresolved = bindings.iter().filter(|b| !b.is_resolved()).count();
    if unresolved > 0 {
        log::info!("{unresolved} of {} key binding(s) unresolved", bindings.len());
    }
}

/// Carry out a binding: switch a notebook's page (negative = last page),
/// press a button, or focus any other target.
pub fn dispatch(tree: &mut ControlTree, binding: &Binding) -> Option<Dispatch> {
    let target = binding.target?;
    let kind = &tree.get(target)?.kind;
    if kind.is_paged() {
        let pages = tree.children(target).len();
        let page = usize::try_from(binding.target_arg).unwrap_or(pages.saturating_sub(1));
        tree.switch_page(target, page);
        return Some(Dispatch::PageSwitched {
            notebook: target,
            page: tree.active_page(target).unwrap_or(page),
        });
    }
    if matches!(kind, ControlKind::Button { .. }) {
        tree.press(target);
        return Some(Dispatch::Pressed(target));
    }
    tree.set_focus(target);
    Some(Dispatch::Focused(target))
}

/// Translate a key name to a key code. Single characters stand for
/// themselves; the rest follow the usual X keysym names.
pub fn parse_key_name(name: &str) -> Option<KeyCode> {
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(ch));
    }
    let code = match name {
        "space" => KeyCode::Char(' '),
        "plus" => KeyCode::Char('+'),
        "minus" => KeyCode::Char('-'),
        "comma" => KeyCode::Char(','),
        "period" => KeyCode::Char('.'),
        "slash" => KeyCode::Char('/'),
        "Tab" => KeyCode::Tab,
        "BackTab" | "ISO_Left_Tab" => KeyCode::BackTab,
        "Return" | "Enter" => KeyCode::Enter,
        "Escape" => KeyCode::Esc,
        "BackSpace" => KeyCode::Backspace,
        "Delete" => KeyCode::Delete,
        "Insert" => KeyCode::Insert,
        "Home" => KeyCode::Home,
        "End" => KeyCode::End,
        "Page_Up" | "Prior" => KeyCode::PageUp,
        "Page_Down" | "Next" => KeyCode::PageDown,
        "Left" => KeyCode::Left,
        "Right" => KeyCode::Right,
        "Up" => KeyCode::Up,
        "Down" => KeyCode::Down,
        _ => {
            let n: u8 = name.strip_prefix('F')?.parse().ok()?;
            if !(1..=12).contains(&n) {
                return None;
            }
            KeyCode::F(n)
        }
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use ratatui::layout::Rect;
    use view::{Control, NotebookState, RangeState};

    use super::*;

    struct Ui {
        tree: ControlTree,
        lfo_tab: ControlId,
        shape: ControlId,
        save: ControlId,
        env: ControlId,
        attack: ControlId,
        cutoff: ControlId,
    }

    fn ui() -> Ui {
        let mut tree = ControlTree::new(Control::named(
            "Main Window",
            ControlKind::Container,
            Rect::new(0, 0, 80, 24),
        ));
        let root = tree.root();
        let button = ControlKind::Button {
            label: "Save".into(),
        };
        let save = tree
            .add(root, Control::named("Save", button, Rect::new(0, 0, 6, 1)))
            .unwrap();
        let lfo_tab = tree
            .add(
                root,
                Control::named(
                    "LFO Tab",
                    ControlKind::Notebook(NotebookState::new(vec!["LFO 1".into(), "LFO 2".into()])),
                    Rect::new(0, 1, 40, 10),
                ),
            )
            .unwrap();
        let page = |name: &str| {
            Control::named(name, ControlKind::Container, Rect::new(0, 2, 40, 9))
        };
        let p1 = tree.add(lfo_tab, page("LFO 1 Page")).unwrap();
        tree.add(lfo_tab, page("LFO 2 Page")).unwrap();
        let shape = tree
            .add(p1, Control::named("Shape", ControlKind::Toggle(false), Rect::new(1, 3, 5, 1)))
            .unwrap();
        let frame = Control::named(
            "Envelope Frame",
            ControlKind::Container,
            Rect::new(40, 1, 40, 10),
        );
        let env = tree.add(root, frame).unwrap();
        let range = || ControlKind::Range(RangeState::new(0, 127));
        let attack = tree
            .add(env, Control::named("Attack", range(), Rect::new(41, 2, 10, 2)))
            .unwrap();
        let cutoff = tree
            .add(root, Control::named("Cutoff", range(), Rect::new(0, 12, 10, 2)))
            .unwrap();
        Ui {
            tree,
            lfo_tab,
            shape,
            save,
            env,
            attack,
            cutoff,
        }
    }

    fn spec(key: &str, param: &str, parent: Option<&str>, parent_arg: i32) -> BindingSpec {
        BindingSpec {
            key: key.into(),
            param: param.into(),
            parent: parent.map(Into::into),
            parent_arg,
            ..Default::default()
        }
    }

    fn bound(specs: &[BindingSpec], tree: &ControlTree) -> KeyBindings {
        let mut bindings = KeyBindings::load(specs);
        bind_all(&mut bindings, tree);
        bindings
    }

    #[test]
    fn page_scoped_row_shadows_general_row_on_its_page() {
        let mut ui = ui();
        let bindings = bound(
            &[spec("s", "Shape", Some("LFO Tab"), 1), spec("s", "Save", None, 0)],
            &ui.tree,
        );
        let key = KeyCode::Char('s');

        // Page 0: the scoped row does not apply, whatever has focus.
        let hit = bindings.resolve(&ui.tree, key, Some(ui.shape)).unwrap();
        assert_eq!(hit.target(), Some(ui.save));

        ui.tree.switch_page(ui.lfo_tab, 1);
        for focus in [None, Some(ui.cutoff), Some(ui.attack)] {
            let hit = bindings.resolve(&ui.tree, key, focus).unwrap();
            assert_eq!(hit.target(), Some(ui.shape));
        }
    }

    #[test]
    fn declaration_order_wins() {
        let mut ui = ui();
        let bindings = bound(
            &[spec("s", "Save", None, 0), spec("s", "Shape", Some("LFO Tab"), 1)],
            &ui.tree,
        );
        ui.tree.switch_page(ui.lfo_tab, 1);
        let hit = bindings.resolve(&ui.tree, KeyCode::Char('s'), None).unwrap();
        assert_eq!(hit.target_name, "Save");
    }

    #[test]
    fn container_context_follows_focus_ancestry() {
        let ui = ui();
        let bindings = bound(&[spec("a", "Attack", Some("Envelope Frame"), 0)], &ui.tree);
        let key = KeyCode::Char('a');
        assert!(bindings.resolve(&ui.tree, key, Some(ui.attack)).is_some());
        assert!(bindings.resolve(&ui.tree, key, Some(ui.env)).is_none());
        assert!(bindings.resolve(&ui.tree, key, Some(ui.cutoff)).is_none());
        assert!(bindings.resolve(&ui.tree, key, None).is_none());
    }

    #[test]
    fn focus_on_the_context_container_itself_matches() {
        let ui = ui();
        let bindings = bound(&[spec("c", "Cutoff", Some("Attack"), 0)], &ui.tree);
        assert!(bindings.resolve(&ui.tree, KeyCode::Char('c'), Some(ui.attack)).is_some());
    }

    #[test]
    fn missing_context_leaves_binding_unresolved() {
        let ui = ui();
        let bindings = bound(
            &[spec("x", "Cutoff", Some("No Such Frame"), 0), spec("y", "Nothing", None, 0)],
            &ui.tree,
        );
        assert_eq!(bindings.len(), 2);
        assert!(bindings.iter().all(|b| !b.is_resolved()));
        assert!(bindings.resolve(&ui.tree, KeyCode::Char('x'), Some(ui.cutoff)).is_none());
        assert!(bindings.resolve(&ui.tree, KeyCode::Char('y'), None).is_none());
    }

    #[test]
    fn unknown_key_names_and_empty_parents() {
        let bindings = KeyBindings::load(&[
            spec("NoSuchKey", "Save", None, 0),
            spec("F13", "Save", None, 0),
            spec("F2", "Save", Some(""), 0),
        ]);
        assert_eq!(bindings.len(), 1);
        let only = bindings.iter().next().unwrap();
        assert_eq!(only.key, KeyCode::F(2));
        assert_eq!(only.context_name, None);
    }

    #[test]
    fn dispatch_switches_pages_presses_and_focuses() {
        let mut ui = ui();
        let bindings = bound(
            &[
                BindingSpec { param_arg: 1, ..spec("2", "LFO Tab", None, 0) },
                BindingSpec { param_arg: -1, ..spec("9", "LFO Tab", None, 0) },
                spec("w", "Save", None, 0),
                spec("c", "Cutoff", None, 0),
            ],
            &ui.tree,
        );
        let run = |tree: &mut ControlTree, key: char| {
            let binding = bindings.resolve(tree, KeyCode::Char(key), None).unwrap().clone();
            dispatch(tree, &binding)
        };

        assert_eq!(
            run(&mut ui.tree, '2'),
            Some(Dispatch::PageSwitched { notebook: ui.lfo_tab, page: 1 })
        );
        assert_eq!(ui.tree.active_page(ui.lfo_tab), Some(1));
        ui.tree.switch_page(ui.lfo_tab, 0);
        assert_eq!(
            run(&mut ui.tree, '9'),
            Some(Dispatch::PageSwitched { notebook: ui.lfo_tab, page: 1 })
        );
        assert_eq!(run(&mut ui.tree, 'w'), Some(Dispatch::Pressed(ui.save)));
        assert_eq!(run(&mut ui.tree, 'c'), Some(Dispatch::Focused(ui.cutoff)));
        assert_eq!(ui.tree.focused(), Some(ui.cutoff));
        assert!(ui.tree.take_signals().contains(&view::Signal::Pressed(ui.save)));
    }

    #[test]
    fn key_names() {
        assert_eq!(parse_key_name("s"), Some(KeyCode::Char('s')));
        assert_eq!(parse_key_name("S"), Some(KeyCode::Char('S')));
        assert_eq!(parse_key_name("Page_Up"), Some(KeyCode::PageUp));
        assert_eq!(parse_key_name("plus"), Some(KeyCode::Char('+')));
        assert_eq!(parse_key_name("F12"), Some(KeyCode::F(12)));
        assert_eq!(parse_key_name("F0"), None);
        assert_eq!(parse_key_name(""), None);
    }
}
