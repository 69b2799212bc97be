use std::ops::{Deref, DerefMut};

use thiserror::Error;

use crate::control::{Control, ControlId, ControlKind, SetValueError, Value};

/// Notification queued by the tree when a control changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    ValueChanged { id: ControlId, value: Value },
    PageSwitched { notebook: ControlId, page: usize },
    VisibilityChanged { id: ControlId, visible: bool },
    Pressed(ControlId),
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("no control with index {0}")]
    UnknownControl(usize),
    #[error("{name} ({kind}) cannot hold child controls")]
    NotAContainer { name: String, kind: &'static str },
}

struct Node {
    control: Control,
    parent: Option<ControlId>,
    children: Vec<ControlId>,
}

/// An instantiated tree of controls rooted at a window.
///
/// Value changes, page switches and button presses made through the tree
/// queue [`Signal`]s for the owner to drain with [`take_signals`], unless
/// signals are blocked by a live [`SignalBlock`].
///
/// [`take_signals`]: ControlTree::take_signals
pub struct ControlTree {
    nodes: Vec<Node>,
    focus: Option<ControlId>,
    signals: Vec<Signal>,
    blocked: usize,
}

impl ControlTree {
    pub fn new(root: Control) -> Self {
        Self {
            nodes: vec![Node {
                control: root,
                parent: None,
                children: Vec::new(),
            }],
            focus: None,
            signals: Vec::new(),
            blocked: 0,
        }
    }

    pub fn root(&self) -> ControlId {
        ControlId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, parent: ControlId, control: Control) -> Result<ControlId, TreeError> {
        let parent_node = self
            .nodes
            .get(parent.0)
            .ok_or(TreeError::UnknownControl(parent.0))?;
        if !parent_node.control.kind.can_hold_children() {
            return Err(TreeError::NotAContainer {
                name: parent_node.control.label().to_string(),
                kind: parent_node.control.kind.kind_name(),
            });
        }
        let id = ControlId(self.nodes.len());
        self.nodes.push(Node {
            control,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn get(&self, id: ControlId) -> Option<&Control> {
        self.nodes.get(id.0).map(|n| &n.control)
    }

    /// Direct access to a control. Changes made this way queue no signals.
    pub fn get_mut(&mut self, id: ControlId) -> Option<&mut Control> {
        self.nodes.get_mut(id.0).map(|n| &mut n.control)
    }

    pub fn parent(&self, id: ControlId) -> Option<ControlId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ControlId) -> &[ControlId] {
        self.nodes.get(id.0).map_or(&[], |n| n.children.as_slice())
    }

    /// Every control in preorder, starting at the root.
    pub fn walk(&self) -> Walk<'_> {
        self.walk_from(self.root())
    }

    /// `id` and everything below it, in preorder.
    pub fn walk_from(&self, id: ControlId) -> Walk<'_> {
        let stack = if id.0 < self.nodes.len() { vec![id] } else { Vec::new() };
        Walk { tree: self, stack }
    }

    /// `id` followed by its parent, grandparent, ... up to the root.
    pub fn ancestors(&self, id: ControlId) -> Ancestors<'_> {
        let next = (id.0 < self.nodes.len()).then_some(id);
        Ancestors { tree: self, next }
    }

    /// True if `ancestor` is `id` itself or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: ControlId, id: ControlId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// First control named `name` in preorder.
    pub fn find_by_name(&self, name: &str) -> Option<ControlId> {
        self.walk()
            .find(|&id| self.nodes[id.0].control.name.as_deref() == Some(name))
    }

    /// Whether the control is actually on screen: it and every ancestor are
    /// visible, and every notebook on the way up shows the page holding it.
    pub fn is_shown(&self, id: ControlId) -> bool {
        let mut child: Option<ControlId> = None;
        for a in self.ancestors(id) {
            let control = &self.nodes[a.0].control;
            if !control.visible {
                return false;
            }
            if let (ControlKind::Notebook(nb), Some(page)) = (&control.kind, child) {
                if self.nodes[a.0].children.get(nb.active) != Some(&page) {
                    return false;
                }
            }
            child = Some(a);
        }
        child.is_some()
    }

    pub fn set_visible(&mut self, id: ControlId, visible: bool) -> bool {
        let Some(control) = self.get_mut(id) else {
            return false;
        };
        if control.visible == visible {
            return false;
        }
        control.visible = visible;
        self.emit(Signal::VisibilityChanged { id, visible });
        true
    }

    pub fn value(&self, id: ControlId) -> Option<Value> {
        self.get(id).and_then(|c| c.kind.value())
    }

    /// Set a control's value with the setter for its kind.
    pub fn set_value(&mut self, id: ControlId, value: &Value) -> Result<(), SetValueError> {
        let control = self
            .nodes
            .get_mut(id.0)
            .map(|n| &mut n.control)
            .ok_or(SetValueError::UnknownControl(id.0))?;
        if control.kind.apply(value)? {
            self.value_changed(id);
        }
        Ok(())
    }

    /// Step a range or choice one increment (or one page) up or down.
    /// Returns true if the value changed.
    pub fn step_value(&mut self, id: ControlId, forward: bool, page: bool) -> bool {
        let changed = match self.get_mut(id).map(|c| &mut c.kind) {
            Some(ControlKind::Range(r)) => r.step(forward, page),
            Some(ControlKind::Choice(c)) => c.step(forward, page),
            _ => false,
        };
        if changed {
            self.value_changed(id);
        }
        changed
    }

    /// Edit a text field in place, e.g. from typed keys.
    pub fn edit_text<F>(&mut self, id: ControlId, edit: F) -> bool
    where
        F: FnOnce(&mut crate::TextInputState) -> bool,
    {
        let changed = match self.get_mut(id).map(|c| &mut c.kind) {
            Some(ControlKind::Text(state)) => edit(state),
            _ => false,
        };
        if changed {
            self.value_changed(id);
        }
        changed
    }

    fn value_changed(&mut self, id: ControlId) {
        if let Some(value) = self.value(id) {
            self.emit(Signal::ValueChanged { id, value });
        }
    }

    /// Show page `page` of a notebook. Out-of-range pages are ignored.
    pub fn switch_page(&mut self, notebook: ControlId, page: usize) -> bool {
        let pages = self.children(notebook).len();
        let Some(ControlKind::Notebook(nb)) = self.get_mut(notebook).map(|c| &mut c.kind) else {
            return false;
        };
        if page >= pages || page == nb.active {
            return false;
        }
        nb.active = page;
        self.emit(Signal::PageSwitched { notebook, page });
        true
    }

    pub fn active_page(&self, notebook: ControlId) -> Option<usize> {
        match self.get(notebook).map(|c| &c.kind) {
            Some(ControlKind::Notebook(nb)) => Some(nb.active),
            _ => None,
        }
    }

    /// Activate a button.
    pub fn press(&mut self, id: ControlId) -> bool {
        if !self.get(id).is_some_and(|c| c.kind.is_trigger()) {
            return false;
        }
        self.emit(Signal::Pressed(id));
        true
    }

    pub fn focused(&self) -> Option<ControlId> {
        self.focus
    }

    /// Move input focus. Containers cannot take focus.
    pub fn set_focus(&mut self, id: ControlId) -> bool {
        if !self.get(id).is_some_and(|c| c.kind.is_focusable()) {
            return false;
        }
        self.focus = Some(id);
        true
    }

    /// Controls that can take focus and are on screen, in preorder.
    pub fn focus_chain(&self) -> Vec<ControlId> {
        self.walk()
            .filter(|&id| self.nodes[id.0].control.kind.is_focusable() && self.is_shown(id))
            .collect()
    }

    fn emit(&mut self, signal: Signal) {
        if self.blocked == 0 {
            self.signals.push(signal);
        }
    }

    /// Block signal emission until the returned guard is dropped.
    pub fn block_signals(&mut self) -> SignalBlock<'_> {
        self.blocked += 1;
        SignalBlock { tree: self }
    }

    pub fn signals_blocked(&self) -> bool {
        self.blocked > 0
    }

    pub fn take_signals(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }
}

/// Scoped signal block. Dereferences to the tree it blocks.
pub struct SignalBlock<'a> {
    tree: &'a mut ControlTree,
}

impl Drop for SignalBlock<'_> {
    fn drop(&mut self) {
        self.tree.blocked -= 1;
    }
}

impl Deref for SignalBlock<'_> {
    type Target = ControlTree;

    fn deref(&self) -> &ControlTree {
        self.tree
    }
}

impl DerefMut for SignalBlock<'_> {
    fn deref_mut(&mut self) -> &mut ControlTree {
        self.tree
    }
}

pub struct Walk<'a> {
    tree: &'a ControlTree,
    stack: Vec<ControlId>,
}

impl Iterator for Walk<'_> {
    type Item = ControlId;

    fn next(&mut self) -> Option<ControlId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[id.0].children.iter().rev().copied());
        Some(id)
    }
}

pub struct Ancestors<'a> {
    tree: &'a ControlTree,
    next: Option<ControlId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ControlId;

    fn next(&mut self) -> Option<ControlId> {
        let id = self.next?;
        self.next = self.tree.nodes[id.0].parent;
        Some(id)
    }
}
