use std::path::Path;

use anyhow::{Context, bail};
use ratatui::layout::Rect;
use serde::Deserialize;
use view::{
    ChoiceState, Control, ControlId, ControlKind, ControlTree, NotebookState, RangeState,
    TextInputState,
};

use crate::keymap::BindingSpec;

/// An instantiated editor layout: the control tree, the key map rows and the
/// containers that take knob groups.
pub struct UiDescription {
    pub tree: ControlTree,
    pub keymap: Vec<BindingSpec>,
    pub knob_groups: Vec<ControlId>,
}

#[derive(Debug, Deserialize)]
struct UiFile {
    window: WindowConfig,
    #[serde(default, rename = "control")]
    controls: Vec<ControlConfig>,
    #[serde(default)]
    keymap: Vec<BindingSpec>,
}

#[derive(Debug, Deserialize)]
struct WindowConfig {
    name: String,
    #[serde(default = "default_width")]
    width: u16,
    #[serde(default = "default_height")]
    height: u16,
    #[serde(default)]
    knob_group: bool,
}

fn default_width() -> u16 {
    80
}

fn default_height() -> u16 {
    24
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindConfig {
    Range,
    Choice,
    Toggle,
    Text,
    Notebook,
    Button,
    Container,
}

/// One `[[control]]` row. Positions are relative to the parent.
#[derive(Debug, Deserialize)]
struct ControlConfig {
    name: Option<String>,
    parent: Option<String>,
    kind: KindConfig,
    #[serde(default)]
    x: u16,
    #[serde(default)]
    y: u16,
    #[serde(default = "one")]
    width: u16,
    #[serde(default = "one")]
    height: u16,
    #[serde(default = "yes")]
    visible: bool,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    pages: Vec<String>,
    label: Option<String>,
    max_len: Option<usize>,
    #[serde(default)]
    min: i32,
    #[serde(default = "default_max")]
    max: i32,
    #[serde(default)]
    knob_group: bool,
}

fn one() -> u16 {
    1
}

fn yes() -> bool {
    true
}

fn default_max() -> i32 {
    127
}

impl ControlConfig {
    fn kind(&self) -> ControlKind {
        match self.kind {
            KindConfig::Range => ControlKind::Range(RangeState::new(self.min, self.max)),
            KindConfig::Choice => ControlKind::Choice(ChoiceState::new(self.options.clone())),
            KindConfig::Toggle => ControlKind::Toggle(false),
            KindConfig::Text => {
                let state = TextInputState::new("");
                ControlKind::Text(match self.max_len {
                    Some(n) => state.with_max_len(n),
                    None => state,
                })
            }
            KindConfig::Notebook => ControlKind::Notebook(NotebookState::new(self.pages.clone())),
            KindConfig::Button => ControlKind::Button {
                label: self
                    .label
                    .clone()
                    .or_else(|| self.name.clone())
                    .unwrap_or_default(),
            },
            KindConfig::Container => ControlKind::Container,
        }
    }
}

pub fn parse(content: &str) -> anyhow::Result<UiDescription> {
    let file: UiFile = toml::from_str(content)?;

    let mut tree = ControlTree::new(Control::named(
        &file.window.name,
        ControlKind::Container,
        Rect::new(0, 0, file.window.width, file.window.height),
    ));
    let mut knob_groups = Vec::new();
    if file.window.knob_group {
        knob_groups.push(tree.root());
    }

    for (row, config) in file.controls.iter().enumerate() {
        let parent = match config.parent.as_deref() {
            None | Some("") => tree.root(),
            Some(name) => match tree.find_by_name(name) {
                Some(id) => id,
                None => bail!(
                    "control #{row} ({}): parent '{name}' is not declared before it",
                    config.name.as_deref().unwrap_or("unnamed")
                ),
            },
        };
        let origin = tree.get(parent).map(|c| c.bounds).unwrap_or_default();
        let bounds = Rect::new(
            origin.x.saturating_add(config.x),
            origin.y.saturating_add(config.y),
            config.width,
            config.height,
        );
        let mut control = Control::new(config.kind(), bounds);
        control.name = config.name.clone();
        control.visible = config.visible;
        let id = tree
            .add(parent, control)
            .with_context(|| format!("control #{row}"))?;
        if config.knob_group {
            knob_groups.push(id);
        }
    }

    label_pages(&mut tree);

    log::info!(
        "Loaded UI '{}': {} control(s), {} key mapping(s)",
        file.window.name,
        tree.len(),
        file.keymap.len()
    );

    Ok(UiDescription {
        tree,
        keymap: file.keymap,
        knob_groups,
    })
}

/// Notebook pages without an explicit label are named after the page
/// container.
fn label_pages(tree: &mut ControlTree) {
    let notebooks: Vec<ControlId> = tree
        .walk()
        .filter(|&id| tree.get(id).is_some_and(|c| c.kind.is_paged()))
        .collect();
    for notebook in notebooks {
        let labels: Vec<String> = tree
            .children(notebook)
            .iter()
            .map(|&page| tree.get(page).map_or("", |c| c.label()).to_string())
            .collect();
        if let Some(ControlKind::Notebook(nb)) = tree.get_mut(notebook).map(|c| &mut c.kind) {
            nb.labels.truncate(labels.len());
            let declared = nb.labels.len();
            nb.labels.extend(labels.into_iter().skip(declared));
        }
    }
}

pub fn load(path: &Path) -> anyhow::Result<UiDescription> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading UI description {}", path.display()))?;
    parse(&content).with_context(|| format!("parsing UI description {}", path.display()))
}
