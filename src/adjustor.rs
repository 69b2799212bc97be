use std::collections::{BTreeMap, HashMap};

use view::{Capability, ControlId, ControlKind, ControlTree, Value};

use crate::device::DeviceLink;
use crate::params::{self, ParamKind, ParamRegistry};

/// Every control bound to one parameter.
pub struct Adjustor {
    id: String,
    index: usize,
    controls: Vec<ControlId>,
}

impl Adjustor {
    /// Parameter id, e.g. "Filter 1 Cutoff".
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn controls(&self) -> &[ControlId] {
        &self.controls
    }
}

/// Parameter index → bound controls. Keeps replicas of a parameter in step
/// with each other and with the device.
#[derive(Default)]
pub struct AdjustorTable {
    adjustors: BTreeMap<usize, Adjustor>,
    bound: HashMap<ControlId, usize>,
}

impl AdjustorTable {
    /// Bind `control` to parameter `index`. Returns false if it was already
    /// bound there.
    pub fn register(&mut self, index: usize, id: &str, control: ControlId) -> bool {
        let adjustor = self.adjustors.entry(index).or_insert_with(|| Adjustor {
            id: id.to_string(),
            index,
            controls: Vec::new(),
        });
        if adjustor.controls.contains(&control) {
            log::debug!("Control {control:?} already bound to '{id}'");
            return false;
        }
        adjustor.controls.push(control);
        self.bound.insert(control, index);
        true
    }

    pub fn adjustor(&self, index: usize) -> Option<&Adjustor> {
        self.adjustors.get(&index)
    }

    /// Parameter index a control is bound to.
    pub fn parameter_of(&self, control: ControlId) -> Option<usize> {
        self.bound.get(&control).copied()
    }

    /// Adjustors in parameter index order.
    pub fn iter(&self) -> impl Iterator<Item = &Adjustor> {
        self.adjustors.values()
    }

    pub fn len(&self) -> usize {
        self.adjustors.len()
    }

    /// A bound control was edited: send the value to the device, then to
    /// every other control of the same parameter.
    ///
    /// Ignored while the tree's signals are blocked, i.e. while a broadcast
    /// is applying values. Returns true if the change was forwarded.
    pub fn on_control_changed(
        &self,
        tree: &mut ControlTree,
        device: &mut dyn DeviceLink,
        page: usize,
        control: ControlId,
        value: &Value,
    ) -> bool {
        if tree.signals_blocked() {
            return false;
        }
        let Some(adjustor) = self
            .parameter_of(control)
            .and_then(|index| self.adjustors.get(&index))
        else {
            log::trace!("Control {control:?} changed but has no parameter");
            return false;
        };
        log::debug!("'{}' (param {}) = {value}", adjustor.id, adjustor.index);
        if let Err(e) = device.submit(adjustor.index, page, value) {
            log::warn!("Failed to send '{}' to device: {e}", adjustor.id);
        }
        broadcast(tree, adjustor, value, Some(control));
        true
    }

    /// The device reported a parameter change. Only changes to the
    /// displayed page reach the controls.
    pub fn on_device_changed(
        &self,
        tree: &mut ControlTree,
        current_page: usize,
        index: usize,
        page: usize,
        value: &Value,
    ) -> bool {
        if page != current_page {
            log::trace!("Param {index} changed on part {page}, showing part {current_page}");
            return false;
        }
        let Some(adjustor) = self.adjustors.get(&index) else {
            return false;
        };
        broadcast(tree, adjustor, value, None);
        true
    }
}

/// Apply `value` to every control of `adjustor` except `excluding`, with the
/// tree's signals blocked for the whole fan-out. Returns the number of
/// controls updated.
fn broadcast(
    tree: &mut ControlTree,
    adjustor: &Adjustor,
    value: &Value,
    excluding: Option<ControlId>,
) -> usize {
    let mut tree = tree.block_signals();
    let mut updated = 0;
    for &control in adjustor.controls.iter().filter(|&&c| Some(c) != excluding) {
        match tree.set_value(control, value) {
            Ok(()) => updated += 1,
            Err(e) => log::warn!(
                "Could not set {} to {value} for '{}': {e}",
                tree.get(control).map_or("?", |c| c.label()),
                adjustor.id
            ),
        }
    }
    log::trace!("'{}': {updated} replica(s) updated", adjustor.id);
    updated
}

/// Bind every named value control whose parameter id is known to the
/// registry. Ranges take their bounds and increments from the parameter,
/// and text fields their maximum length.
pub fn build(tree: &mut ControlTree, registry: &dyn ParamRegistry) -> AdjustorTable {
    let mut table = AdjustorTable::default();
    let ids: Vec<ControlId> = tree.walk().collect();

    for id in ids {
        let Some(control) = tree.get(id) else {
            continue;
        };
        let (Some(name), Some(capability)) = (control.name.clone(), control.kind.capability())
        else {
            continue;
        };
        let param_id = params::parameter_id(&name);
        let Some(index) = registry.find_index(param_id) else {
            log::debug!("No parameter '{param_id}' for control '{name}'");
            continue;
        };
        table.register(index, param_id, id);

        let props = registry.properties(index);
        match (capability, props) {
            (_, None) => {
                log::warn!("Control '{name}' has no parameter properties, keeping its own");
            }
            (Capability::Range | Capability::Text, Some(props)) => {
                configure(tree, id, props);
            }
            _ => {}
        }
    }

    log::info!("{} parameter(s) bound to controls", table.len());
    table
}

fn configure(tree: &mut ControlTree, id: ControlId, props: params::ParamProperties) {
    let Some(control) = tree.get_mut(id) else {
        return;
    };
    match &mut control.kind {
        ControlKind::Range(range) => range.configure(props.min, props.max, props.step),
        ControlKind::Text(text) if props.kind == ParamKind::Text => {
            text.max_len = usize::try_from(props.max).ok();
            let current = text.value.clone();
            text.set_text(&current);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use ratatui::layout::Rect;
    use view::{ChoiceState, Control, RangeState, TextInputState};

    use super::*;
    use crate::device::RecordingDevice;
    use crate::params::SynthDefinition;

    const SYNTH: &str = r#"
name = "Mini"
patch_name = "Patch Name"

[[param]]
name = "Filter 1 Cutoff"
min = 0
max = 127

[[param]]
name = "LFO 1 Shape"
kind = "enumerated"
max = 3

[[param]]
name = "Patch Name"
kind = "text"
max = 8
"#;

    struct Fixture {
        tree: ControlTree,
        table: AdjustorTable,
        cutoff: ControlId,
        cutoff2: ControlId,
        shape: ControlId,
        name: ControlId,
    }

    fn fixture() -> Fixture {
        let mut tree = ControlTree::new(Control::named(
            "Main Window",
            ControlKind::Container,
            Rect::new(0, 0, 80, 24),
        ));
        let root = tree.root();
        let range = || ControlKind::Range(RangeState::new(0, 10));
        let cutoff = tree
            .add(root, Control::named("Filter 1 Cutoff", range(), Rect::new(0, 0, 10, 2)))
            .unwrap();
        let cutoff2 = tree
            .add(root, Control::named("Filter 1 Cutoff2", range(), Rect::new(20, 0, 10, 2)))
            .unwrap();
        let shape = tree
            .add(
                root,
                Control::named(
                    "LFO 1 Shape",
                    ControlKind::Choice(ChoiceState::new(vec!["Sine".into(), "Tri".into()])),
                    Rect::new(0, 4, 10, 1),
                ),
            )
            .unwrap();
        let name = tree
            .add(
                root,
                Control::named(
                    "Patch Name",
                    ControlKind::Text(TextInputState::new("Init Patch One")),
                    Rect::new(0, 6, 20, 1),
                ),
            )
            .unwrap();
        tree.add(
            root,
            Control::named("Unknown Knob", ControlKind::Toggle(false), Rect::new(0, 8, 5, 1)),
        )
        .unwrap();
        let synth = SynthDefinition::parse(SYNTH).unwrap();
        let table = build(&mut tree, &synth);
        Fixture {
            tree,
            table,
            cutoff,
            cutoff2,
            shape,
            name,
        }
    }

    #[test]
    fn build_groups_replicas_by_parameter_id() {
        let f = fixture();
        assert_eq!(f.table.len(), 3);
        let cutoff = f.table.adjustor(0).unwrap();
        assert_eq!(cutoff.id(), "Filter 1 Cutoff");
        assert_eq!(cutoff.controls(), &[f.cutoff, f.cutoff2]);
        assert_eq!(f.table.parameter_of(f.shape), Some(1));
        assert_eq!(f.table.parameter_of(f.tree.root()), None);
    }

    #[test]
    fn build_configures_ranges_and_text_limits() {
        let f = fixture();
        match &f.tree.get(f.cutoff).unwrap().kind {
            ControlKind::Range(r) => assert_eq!((r.min, r.max, r.page), (0, 127, 10)),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(f.tree.value(f.name), Some(Value::Text("Init Pat".into())));
    }

    #[test]
    fn register_is_idempotent() {
        let mut f = fixture();
        assert!(!f.table.register(0, "Filter 1 Cutoff", f.cutoff));
        assert_eq!(f.table.adjustor(0).unwrap().controls().len(), 2);
    }

    #[test]
    fn control_change_goes_to_device_and_other_replicas() {
        let mut f = fixture();
        let mut device = RecordingDevice::default();
        f.tree.set_value(f.cutoff, &Value::Int(90)).unwrap();
        f.tree.take_signals();

        let value = Value::Int(90);
        assert!(f.table.on_control_changed(&mut f.tree, &mut device, 2, f.cutoff, &value));

        assert_eq!(*device.sent.borrow(), vec![(0, 2, Value::Int(90))]);
        assert_eq!(f.tree.value(f.cutoff2), Some(Value::Int(90)));
        assert!(f.tree.take_signals().is_empty());
        assert!(!f.tree.signals_blocked());
    }

    #[test]
    fn broadcast_never_touches_the_originating_control() {
        let mut f = fixture();
        let mut device = RecordingDevice::default();
        // The originating control shows 5; a broadcast of 7 must leave it alone.
        f.tree.set_value(f.cutoff, &Value::Int(5)).unwrap();
        f.table.on_control_changed(&mut f.tree, &mut device, 0, f.cutoff, &Value::Int(7));
        assert_eq!(f.tree.value(f.cutoff), Some(Value::Int(5)));
        assert_eq!(f.tree.value(f.cutoff2), Some(Value::Int(7)));
    }

    #[test]
    fn changes_are_ignored_while_signals_are_blocked() {
        let mut f = fixture();
        let mut device = RecordingDevice::default();
        let mut blocked = f.tree.block_signals();
        let value = Value::Int(3);
        assert!(!f.table.on_control_changed(&mut blocked, &mut device, 0, f.cutoff, &value));
        drop(blocked);
        assert!(device.sent.borrow().is_empty());
        assert_eq!(f.tree.value(f.cutoff2), Some(Value::Int(0)));
    }

    #[test]
    fn device_failure_still_updates_replicas() {
        let mut f = fixture();
        let mut device = RecordingDevice {
            fail: true,
            ..Default::default()
        };
        let value = Value::Int(12);
        assert!(f.table.on_control_changed(&mut f.tree, &mut device, 0, f.cutoff2, &value));
        assert_eq!(f.tree.value(f.cutoff), Some(Value::Int(12)));
    }

    #[test]
    fn device_change_updates_all_replicas_on_current_page() {
        let mut f = fixture();
        assert!(f.table.on_device_changed(&mut f.tree, 1, 0, 1, &Value::Int(33)));
        assert_eq!(f.tree.value(f.cutoff), Some(Value::Int(33)));
        assert_eq!(f.tree.value(f.cutoff2), Some(Value::Int(33)));
        assert!(f.tree.take_signals().is_empty());
    }

    #[test]
    fn device_change_for_other_page_updates_nothing() {
        let mut f = fixture();
        assert!(!f.table.on_device_changed(&mut f.tree, 0, 0, 1, &Value::Int(33)));
        assert!(!f.table.on_device_changed(&mut f.tree, 0, 1, 1, &Value::Int(2)));
        assert_eq!(f.tree.value(f.cutoff), Some(Value::Int(0)));
        assert_eq!(f.tree.value(f.shape), Some(Value::Int(0)));
    }

    #[test]
    fn failing_setter_does_not_leave_signals_blocked() {
        let mut f = fixture();
        // Choice has two options; index 3 is rejected by its setter.
        assert!(f.table.on_device_changed(&mut f.tree, 0, 1, 0, &Value::Int(3)));
        assert_eq!(f.tree.value(f.shape), Some(Value::Int(0)));
        assert!(!f.tree.signals_blocked());

        f.tree.set_value(f.shape, &Value::Int(1)).unwrap();
        assert_eq!(f.tree.take_signals().len(), 1);
    }
}
