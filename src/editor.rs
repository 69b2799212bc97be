use std::fmt::Write as _;

use crossterm::event::{KeyEvent, KeyModifiers};
use view::{Capability, ControlId, ControlKind, ControlTree, Signal, Value};

use crate::adjustor::{self, AdjustorTable};
use crate::device::{DeviceEvent, DeviceLink};
use crate::keymap::{self, KeyBindings};
use crate::knobs::{self, KnobMapper};
use crate::midi::KnobEvent;
use crate::navigation::{self, NavAction};
use crate::params::ParamRegistry;
use crate::ui::UiDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Unhandled,
}

/// A synthesizer editor: the control tree plus everything that keeps it in
/// step with the device, the knob controller and the keyboard.
///
/// Edits made through [`tree_mut`](Editor::tree_mut) take effect on the
/// next [`flush`](Editor::flush).
pub struct Editor {
    tree: ControlTree,
    registry: Box<dyn ParamRegistry>,
    device: Box<dyn DeviceLink>,
    adjustors: AdjustorTable,
    knobs: KnobMapper,
    bindings: KeyBindings,
    page: usize,
    patch_name: String,
    patch_param: Option<usize>,
    last_pressed: Option<ControlId>,
}

impl Editor {
    pub fn new(
        ui: UiDescription,
        registry: Box<dyn ParamRegistry>,
        device: Box<dyn DeviceLink>,
    ) -> Self {
        let UiDescription {
            mut tree,
            keymap,
            knob_groups,
        } = ui;

        let adjustors = adjustor::build(&mut tree, registry.as_ref());
        let knobs = knobs::build(&tree, registry.as_ref(), &knob_groups);
        let mut bindings = KeyBindings::load(&keymap);
        keymap::bind_all(&mut bindings, &tree);

        // Building is not editing.
        tree.take_signals();
        let chain = tree.focus_chain();
        let initial = chain
            .iter()
            .copied()
            .find(|&id| {
                tree.get(id)
                    .is_some_and(|c| !matches!(c.kind, ControlKind::Text(_)))
            })
            .or(chain.first().copied());
        if let Some(id) = initial {
            tree.set_focus(id);
        }

        let patch_param = registry
            .patch_name_id()
            .and_then(|id| registry.find_index(id));
        let patch_name = patch_param
            .and_then(|index| adjustors.adjustor(index))
            .and_then(|a| a.controls().first())
            .and_then(|&id| tree.value(id))
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_default();

        Editor {
            tree,
            registry,
            device,
            adjustors,
            knobs,
            bindings,
            page: 0,
            patch_name,
            patch_param,
            last_pressed: None,
        }
    }

    pub fn tree(&self) -> &ControlTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ControlTree {
        &mut self.tree
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn patch_name(&self) -> &str {
        &self.patch_name
    }

    pub fn title(&self) -> String {
        format!(
            "{} Editor - {} (Part {})",
            self.registry.synth_name(),
            self.patch_name,
            self.page + 1
        )
    }

    /// Select the device part the controls show and edit.
    pub fn set_page(&mut self, page: usize) {
        if page != self.page {
            log::info!("Editing part {}", page + 1);
            self.page = page;
        }
    }

    pub fn on_control_changed(&mut self, control: ControlId, value: &Value) -> bool {
        let forwarded = self.adjustors.on_control_changed(
            &mut self.tree,
            self.device.as_mut(),
            self.page,
            control,
            value,
        );
        if forwarded {
            self.note_patch_name(self.adjustors.parameter_of(control), value);
        }
        forwarded
    }

    pub fn on_device_changed(&mut self, event: &DeviceEvent) -> bool {
        let applied = self.adjustors.on_device_changed(
            &mut self.tree,
            self.page,
            event.index,
            event.page,
            &event.value,
        );
        if applied {
            self.note_patch_name(Some(event.index), &event.value);
        }
        applied
    }

    fn note_patch_name(&mut self, index: Option<usize>, value: &Value) {
        if index.is_some()
            && index == self.patch_param
            && let Some(name) = value.as_text()
        {
            self.patch_name = name.to_string();
        }
    }

    /// Route a key press: text fields keep their keys, then navigation,
    /// then the key map.
    pub fn on_key_event(&mut self, key: KeyEvent) -> KeyOutcome {
        let focused = self.tree.focused();
        let capability = focused
            .and_then(|id| self.tree.get(id))
            .and_then(|c| c.kind.capability());
        if capability == Some(Capability::Text) {
            return KeyOutcome::Unhandled;
        }

        if let Some(action) = navigation::navigation(key.code, key.modifiers, capability) {
            match action {
                NavAction::MoveFocus(direction) => {
                    navigation::move_focus(&mut self.tree, direction);
                }
                NavAction::Step { forward, page } => {
                    if let Some(id) = focused {
                        self.tree.step_value(id, forward, page);
                    }
                }
            }
            self.flush();
            return KeyOutcome::Handled;
        }

        if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            return KeyOutcome::Unhandled;
        }
        let binding = self.bindings.resolve(&self.tree, key.code, focused).cloned();
        let Some(binding) = binding else {
            log::trace!("No binding for {:?}", key.code);
            return KeyOutcome::Unhandled;
        };
        log::debug!(
            "Key '{}' -> '{}' {:?}",
            binding.key_name,
            binding.target_name,
            binding.target()
        );
        keymap::dispatch(&mut self.tree, &binding);
        self.flush();
        KeyOutcome::Handled
    }

    /// Turn the control knob `event.knob` addresses in the first knob group
    /// on screen.
    pub fn on_knob(&mut self, event: KnobEvent) -> bool {
        let Some(group) = self.knobs.active_group(&self.tree) else {
            log::debug!("No knob group on screen");
            return false;
        };
        let Some(control) = self.knobs.resolve(group, &self.tree, event.knob) else {
            log::debug!("Knob {} has no control", event.knob);
            return false;
        };
        let forward = event.delta > 0;
        let changed = match self.tree.get(control).map(|c| &c.kind) {
            Some(ControlKind::Toggle(on)) if *on != forward => self
                .tree
                .set_value(control, &Value::Int(i32::from(forward)))
                .is_ok(),
            Some(ControlKind::Choice(_)) => {
                let mut changed = false;
                for _ in 0..event.delta.unsigned_abs() {
                    changed |= self.tree.step_value(control, forward, false);
                }
                changed
            }
            _ => false,
        };
        self.flush();
        changed
    }

    /// Handle everything the tree queued since the last flush.
    pub fn flush(&mut self) {
        loop {
            let signals = self.tree.take_signals();
            if signals.is_empty() {
                break;
            }
            for signal in signals {
                match signal {
                    Signal::ValueChanged { id, value } => {
                        self.on_control_changed(id, &value);
                    }
                    Signal::PageSwitched { .. } | Signal::VisibilityChanged { .. } => {
                        self.knobs.invalidate_all();
                    }
                    Signal::Pressed(id) => {
                        log::info!(
                            "Pressed '{}'",
                            self.tree.get(id).map_or("?", |c| c.label())
                        );
                        self.last_pressed = Some(id);
                    }
                }
            }
        }
    }

    /// The button pressed most recently.
    pub fn last_pressed(&self) -> Option<ControlId> {
        self.last_pressed
    }

    pub fn describe(&mut self) -> String {
        let mut out = String::new();
        let label = |tree: &ControlTree, id: ControlId| {
            tree.get(id).map_or("?", |c| c.label()).to_string()
        };

        let _ = writeln!(out, "{}", self.title());
        let total = self.registry.len();
        let unbound: Vec<&str> = (0..total)
            .filter(|&index| self.adjustors.adjustor(index).is_none())
            .filter_map(|index| self.registry.param_name(index))
            .collect();
        let _ = writeln!(
            out,
            "  Parameters:    {total} ({} without controls)",
            unbound.len()
        );
        if !unbound.is_empty() {
            let _ = writeln!(out, "    {}", unbound.join(", "));
        }
        let _ = writeln!(out, "  Adjustors:     {}", self.adjustors.len());
        for adjustor in self.adjustors.iter() {
            let controls: Vec<String> = adjustor
                .controls()
                .iter()
                .map(|&id| label(&self.tree, id))
                .collect();
            let _ = writeln!(
                out,
                "    [{}] {}: {}",
                adjustor.index(),
                adjustor.id(),
                controls.join(", ")
            );
        }

        let groups: Vec<_> = self.knobs.groups().collect();
        let _ = writeln!(out, "  Knob groups:   {}", groups.len());
        for group in groups {
            let Some((container, eligible)) = self
                .knobs
                .map(group)
                .map(|m| (m.container(), m.eligible().len()))
            else {
                continue;
            };
            let order: Vec<String> = (0..)
                .map_while(|ordinal| self.knobs.resolve(group, &self.tree, ordinal))
                .map(|id| label(&self.tree, id))
                .collect();
            let _ = writeln!(
                out,
                "    {}: {} [{eligible} eligible]",
                label(&self.tree, container),
                if order.is_empty() {
                    "(none on screen)".to_string()
                } else {
                    order.join(", ")
                }
            );
        }

        let _ = writeln!(out, "  Key bindings:  {}", self.bindings.len());
        for binding in self.bindings.iter() {
            let context = match &binding.context_name {
                Some(name) => format!(" in {name} ({})", binding.context_arg),
                None => String::new(),
            };
            let state = if binding.is_resolved() { "" } else { " (unresolved)" };
            let _ = writeln!(
                out,
                "    {} -> {} ({}){context}{state}",
                binding.key_name, binding.target_name, binding.target_arg
            );
        }
        out
    }
}
