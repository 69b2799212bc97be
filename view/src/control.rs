use std::fmt;

use ratatui::layout::Rect;
use thiserror::Error;

use crate::text_input::TextInputState;

/// Handle to a control inside a [`ControlTree`](crate::ControlTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub(crate) usize);

/// A value carried by a value-holding control.
///
/// Ranges, choices and toggles hold integers (choice = active option index,
/// toggle = 0 or 1). Text fields hold strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Int(_) => None,
            Value::Text(s) => Some(s),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// What kind of value a control edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Range,
    Choice,
    Toggle,
    Text,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetValueError {
    #[error("{kind} control does not take a {value} value")]
    Mismatch {
        kind: &'static str,
        value: &'static str,
    },
    #[error("choice index {index} out of range (0..{len})")]
    ChoiceOutOfRange { index: i32, len: usize },
    #[error("{0} control holds no value")]
    NoValue(&'static str),
    #[error("no control with index {0}")]
    UnknownControl(usize),
}

/// Slider state. `page` is the large increment used by shifted steps.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeState {
    pub value: i32,
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub page: i32,
}

impl RangeState {
    pub fn new(min: i32, max: i32) -> Self {
        let mut range = Self {
            value: min,
            min,
            max,
            step: 1,
            page: 10,
        };
        range.configure(min, max, 1);
        range
    }

    /// Set bounds and increments, clamping the current value into them.
    pub fn configure(&mut self, min: i32, max: i32, step: i32) {
        self.min = min;
        self.max = max.max(min);
        self.step = step.max(1);
        self.page = 10 * self.step;
        self.value = self.value.clamp(self.min, self.max);
    }

    /// Returns true if the value changed.
    pub fn set(&mut self, value: i32) -> bool {
        let value = value.clamp(self.min, self.max);
        let changed = value != self.value;
        self.value = value;
        changed
    }

    pub fn step(&mut self, forward: bool, page: bool) -> bool {
        let delta = if page { self.page } else { self.step };
        self.set(self.value.saturating_add(if forward { delta } else { -delta }))
    }

    /// Position of the value within the bounds, 0.0..=1.0.
    pub fn fraction(&self) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        (self.value - self.min) as f64 / (self.max - self.min) as f64
    }
}

/// Drop-down style selection among named options.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceState {
    pub options: Vec<String>,
    pub active: usize,
}

impl ChoiceState {
    pub fn new(options: Vec<String>) -> Self {
        Self { options, active: 0 }
    }

    pub fn select(&mut self, index: i32) -> Result<bool, SetValueError> {
        let len = self.options.len();
        let Some(index) = usize::try_from(index).ok().filter(|&i| i < len) else {
            return Err(SetValueError::ChoiceOutOfRange { index, len });
        };
        let changed = index != self.active;
        self.active = index;
        Ok(changed)
    }

    /// Move one option forward/backward. A page step jumps to the last or
    /// first option.
    pub fn step(&mut self, forward: bool, page: bool) -> bool {
        let last = self.options.len().saturating_sub(1);
        let next = match (forward, page) {
            (true, true) => last,
            (false, true) => 0,
            (true, false) => (self.active + 1).min(last),
            (false, false) => self.active.saturating_sub(1),
        };
        let changed = next != self.active;
        self.active = next;
        changed
    }

    pub fn label(&self) -> &str {
        self.options.get(self.active).map_or("", String::as_str)
    }
}

/// Paged container: each child is one page.
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookState {
    pub labels: Vec<String>,
    pub active: usize,
}

impl NotebookState {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels, active: 0 }
    }
}

#[derive(Debug, Clone)]
pub enum ControlKind {
    Range(RangeState),
    Choice(ChoiceState),
    Toggle(bool),
    Text(TextInputState),
    Notebook(NotebookState),
    Button { label: String },
    Container,
}

impl ControlKind {
    pub fn capability(&self) -> Option<Capability> {
        match self {
            ControlKind::Range(_) => Some(Capability::Range),
            ControlKind::Choice(_) => Some(Capability::Choice),
            ControlKind::Toggle(_) => Some(Capability::Toggle),
            ControlKind::Text(_) => Some(Capability::Text),
            _ => None,
        }
    }

    pub fn is_paged(&self) -> bool {
        matches!(self, ControlKind::Notebook(_))
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, ControlKind::Button { .. })
    }

    pub fn can_hold_children(&self) -> bool {
        matches!(self, ControlKind::Notebook(_) | ControlKind::Container)
    }

    pub fn is_focusable(&self) -> bool {
        !matches!(self, ControlKind::Container)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ControlKind::Range(_) => "range",
            ControlKind::Choice(_) => "choice",
            ControlKind::Toggle(_) => "toggle",
            ControlKind::Text(_) => "text",
            ControlKind::Notebook(_) => "notebook",
            ControlKind::Button { .. } => "button",
            ControlKind::Container => "container",
        }
    }

    pub fn value(&self) -> Option<Value> {
        match self {
            ControlKind::Range(r) => Some(Value::Int(r.value)),
            ControlKind::Choice(c) => Some(Value::Int(c.active as i32)),
            ControlKind::Toggle(on) => Some(Value::Int(i32::from(*on))),
            ControlKind::Text(t) => Some(Value::Text(t.value.clone())),
            _ => None,
        }
    }

    /// Apply `value` with the setter matching this kind. Returns whether the
    /// stored value changed.
    pub(crate) fn apply(&mut self, value: &Value) -> Result<bool, SetValueError> {
        let kind = self.kind_name();
        let mismatch = || SetValueError::Mismatch {
            kind,
            value: value.type_name(),
        };
        match (self, value) {
            (ControlKind::Range(r), Value::Int(v)) => Ok(r.set(*v)),
            (ControlKind::Choice(c), Value::Int(v)) => c.select(*v),
            (ControlKind::Toggle(on), Value::Int(v)) => {
                let next = *v != 0;
                let changed = next != *on;
                *on = next;
                Ok(changed)
            }
            (ControlKind::Text(t), Value::Text(s)) => Ok(t.set_text(s)),
            (ControlKind::Range(_) | ControlKind::Choice(_) | ControlKind::Toggle(_), _)
            | (ControlKind::Text(_), _) => Err(mismatch()),
            _ => Err(SetValueError::NoValue(kind)),
        }
    }
}

/// A node of the control tree.
#[derive(Debug, Clone)]
pub struct Control {
    /// Declared id, e.g. "Filter 1 Cutoff2".
    pub name: Option<String>,
    pub kind: ControlKind,
    pub bounds: Rect,
    pub visible: bool,
}

impl Control {
    pub fn new(kind: ControlKind, bounds: Rect) -> Self {
        Self {
            name: None,
            kind,
            bounds,
            visible: true,
        }
    }

    pub fn named(name: &str, kind: ControlKind, bounds: Rect) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::new(kind, bounds)
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Name for display and log messages.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.kind_name())
    }
}

/// Center point of `rect`, halving with integer division.
pub fn center(rect: Rect) -> (i32, i32) {
    (
        i32::from(rect.x) + i32::from(rect.width) / 2,
        i32::from(rect.y) + i32::from(rect.height) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_clamps_and_steps() {
        let mut r = RangeState::new(0, 127);
        assert!(r.set(200));
        assert_eq!(r.value, 127);
        assert!(!r.step(true, false));
        assert!(r.step(false, true));
        assert_eq!(r.value, 117);
    }

    #[test]
    fn configure_sets_page_from_step() {
        let mut r = RangeState::new(0, 10);
        r.configure(-64, 63, 2);
        assert_eq!(r.page, 20);
        assert_eq!(r.value, 0);
    }

    #[test]
    fn choice_rejects_out_of_range_index() {
        let mut c = ChoiceState::new(vec!["Sine".into(), "Saw".into()]);
        assert_eq!(
            c.select(2),
            Err(SetValueError::ChoiceOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            c.select(-1),
            Err(SetValueError::ChoiceOutOfRange { index: -1, len: 2 })
        );
        assert_eq!(c.select(1), Ok(true));
        assert_eq!(c.label(), "Saw");
    }

    #[test]
    fn choice_page_step_jumps_to_ends() {
        let mut c = ChoiceState::new(vec!["a".into(), "b".into(), "c".into()]);
        assert!(c.step(true, true));
        assert_eq!(c.active, 2);
        assert!(!c.step(true, false));
        assert!(c.step(false, true));
        assert_eq!(c.active, 0);
    }

    #[test]
    fn apply_rejects_mismatched_value() {
        let mut kind = ControlKind::Toggle(false);
        assert!(kind.apply(&Value::Text("on".into())).is_err());
        assert_eq!(kind.apply(&Value::Int(5)), Ok(true));
        assert_eq!(kind.value(), Some(Value::Int(1)));

        let mut button = ControlKind::Button { label: "Save".into() };
        assert_eq!(button.apply(&Value::Int(1)), Err(SetValueError::NoValue("button")));
    }

    #[test]
    fn center_uses_integer_halves() {
        assert_eq!(center(Rect::new(10, 4, 5, 3)), (12, 5));
    }
}
