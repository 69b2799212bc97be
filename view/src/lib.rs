pub mod control;
pub mod tab_bar;
pub mod text_input;
pub mod tree;

pub use control::{
    Capability, ChoiceState, Control, ControlId, ControlKind, NotebookState, RangeState,
    SetValueError, Value, center,
};
pub use tab_bar::TabBar;
pub use text_input::{TextInput, TextInputState};
pub use tree::{ControlTree, Signal, SignalBlock, TreeError};
