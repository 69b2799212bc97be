use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Continuous,
    Enumerated,
    Boolean,
    /// Text parameters use `max` as their maximum length.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamProperties {
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub kind: ParamKind,
}

/// Parameter metadata of one synthesizer model.
pub trait ParamRegistry {
    /// Model name, e.g. "Blofeld".
    fn synth_name(&self) -> &str;
    fn len(&self) -> usize;
    fn find_index(&self, id: &str) -> Option<usize>;
    fn param_name(&self, index: usize) -> Option<&str>;
    fn properties(&self, index: usize) -> Option<ParamProperties>;
    /// Id of the parameter holding the patch name, if the model has one.
    fn patch_name_id(&self) -> Option<&str>;
}

/// Parameter id for a control name: trailing instance digits are dropped, so
/// "LFO 1 Shape2" and "LFO 1 Shape" both edit "LFO 1 Shape".
pub fn parameter_id(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

#[derive(Debug, Deserialize)]
pub struct ParamConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub min: i32,
    #[serde(default = "default_max")]
    pub max: i32,
    #[serde(default = "default_step")]
    pub step: i32,
}

fn default_max() -> i32 {
    127
}

fn default_step() -> i32 {
    1
}

/// Synth definition file: model name, patch name parameter and the
/// ordered parameter list. A parameter's index is its position in the list.
#[derive(Debug, Deserialize)]
pub struct SynthDefinition {
    pub name: String,
    pub patch_name: Option<String>,
    #[serde(default, rename = "param")]
    pub params: Vec<ParamConfig>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SynthDefinition {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut def: SynthDefinition = toml::from_str(content)?;
        def.build_index();
        Ok(def)
    }

    fn build_index(&mut self) {
        self.index.clear();
        for (i, param) in self.params.iter().enumerate() {
            if self.index.contains_key(&param.name) {
                log::warn!(
                    "Duplicate parameter '{}' at index {i}, keeping index {}",
                    param.name,
                    self.index[&param.name]
                );
                continue;
            }
            self.index.insert(param.name.clone(), i);
        }
    }
}

pub fn load(path: &Path) -> anyhow::Result<SynthDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading synth definition {}", path.display()))?;
    SynthDefinition::parse(&content)
        .with_context(|| format!("parsing synth definition {}", path.display()))
}

impl ParamRegistry for SynthDefinition {
    fn synth_name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.params.len()
    }

    fn find_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    fn param_name(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|p| p.name.as_str())
    }

    fn properties(&self, index: usize) -> Option<ParamProperties> {
        self.params.get(index).map(|p| ParamProperties {
            min: p.min,
            max: p.max,
            step: p.step,
            kind: p.kind,
        })
    }

    fn patch_name_id(&self) -> Option<&str> {
        self.patch_name.as_deref()
    }
}
