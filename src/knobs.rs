//! Physical knob → on-screen control mapping.
//!
//! Knob N addresses the Nth eligible control of a group that is currently on
//! screen, counting left to right (top to bottom within a column). Switching
//! pages therefore remaps the knobs without any per-page setup. The ordering
//! is computed lazily: [`KnobMapper::invalidate`] only marks a group stale,
//! and the next [`KnobMapper::resolve`] re-sorts it once.

use std::collections::HashSet;

use thiserror::Error;
use view::{Capability, ControlId, ControlTree, center};

use crate::params::{self, ParamRegistry};

/// Handle to one knob group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnobGroup(usize);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KnobError {
    #[error("knob group for {requested:?} started while group {open:?} is still open")]
    GroupOpen { open: KnobGroup, requested: ControlId },
    #[error("knob group {0:?} is not open")]
    NotOpen(KnobGroup),
}

/// Eligible controls of one container and their cached on-screen order.
pub struct KnobMap {
    container: ControlId,
    eligible: Vec<ControlId>,
    active: Vec<ControlId>,
    sorted: bool,
    last: Option<(usize, Option<ControlId>)>,
    rebuilds: usize,
}

impl KnobMap {
    fn new(container: ControlId) -> Self {
        Self {
            container,
            eligible: Vec::new(),
            active: Vec::new(),
            sorted: false,
            last: None,
            rebuilds: 0,
        }
    }

    pub fn container(&self) -> ControlId {
        self.container
    }

    pub fn eligible(&self) -> &[ControlId] {
        &self.eligible
    }

    /// How many times the active list has been rebuilt.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    fn resolve(&mut self, tree: &ControlTree, ordinal: usize) -> Option<ControlId> {
        if self.sorted
            && let Some((last_ordinal, hit)) = self.last
            && last_ordinal == ordinal
        {
            return hit;
        }
        if !self.sorted {
            self.rebuild(tree);
        }
        let hit = self.active.get(ordinal).copied();
        self.last = Some((ordinal, hit));
        hit
    }

    fn rebuild(&mut self, tree: &ControlTree) {
        self.active = self
            .eligible
            .iter()
            .copied()
            .filter(|&id| tree.is_shown(id))
            .collect();
        self.active.sort_by_key(|&id| {
            tree.get(id).map_or((i32::MAX, i32::MAX), |c| center(c.bounds))
        });
        self.sorted = true;
        self.rebuilds += 1;
        log::debug!(
            "Knob group {:?}: {} of {} controls on screen",
            self.container,
            self.active.len(),
            self.eligible.len()
        );
    }
}

/// All knob groups, built one at a time.
#[derive(Default)]
pub struct KnobMapper {
    maps: Vec<KnobMap>,
    open: Option<KnobGroup>,
}

impl KnobMapper {
    /// Start collecting controls for `container`. Only one group can be
    /// under construction at a time.
    pub fn begin_group(&mut self, container: ControlId) -> Result<KnobGroup, KnobError> {
        if let Some(open) = self.open {
            return Err(KnobError::GroupOpen {
                open,
                requested: container,
            });
        }
        let group = KnobGroup(self.maps.len());
        self.maps.push(KnobMap::new(container));
        self.open = Some(group);
        Ok(group)
    }

    /// Add `control` to the open group. Ranges are never eligible; returns
    /// Ok(false) when the control was skipped.
    pub fn add_control(
        &mut self,
        group: KnobGroup,
        tree: &ControlTree,
        control: ControlId,
    ) -> Result<bool, KnobError> {
        if self.open != Some(group) {
            return Err(KnobError::NotOpen(group));
        }
        let capability = tree.get(control).and_then(|c| c.kind.capability());
        if capability == Some(Capability::Range) {
            return Ok(false);
        }
        self.maps[group.0].eligible.push(control);
        Ok(true)
    }

    pub fn end_group(&mut self, group: KnobGroup) -> Result<KnobGroup, KnobError> {
        if self.open != Some(group) {
            return Err(KnobError::NotOpen(group));
        }
        self.open = None;
        Ok(group)
    }

    /// Control addressed by knob `ordinal` (0-based) in `group`.
    pub fn resolve(
        &mut self,
        group: KnobGroup,
        tree: &ControlTree,
        ordinal: usize,
    ) -> Option<ControlId> {
        self.maps.get_mut(group.0)?.resolve(tree, ordinal)
    }

    /// Mark the group's order stale; it is recomputed on the next resolve.
    pub fn invalidate(&mut self, group: KnobGroup) {
        if let Some(map) = self.maps.get_mut(group.0) {
            map.sorted = false;
        }
    }

    pub fn invalidate_all(&mut self) {
        for map in &mut self.maps {
            map.sorted = false;
        }
    }

    pub fn map(&self, group: KnobGroup) -> Option<&KnobMap> {
        self.maps.get(group.0)
    }

    pub fn groups(&self) -> impl Iterator<Item = KnobGroup> + use<> {
        (0..self.maps.len()).map(KnobGroup)
    }

    /// First group whose container is on screen.
    pub fn active_group(&self, tree: &ControlTree) -> Option<KnobGroup> {
        self.groups()
            .find(|g| tree.is_shown(self.maps[g.0].container))
    }
}

/// Build one group per container in `group_roots`. Candidates are named
/// value controls other than text fields whose parameter is known to the
/// registry. A group container nested inside another is rejected and its
/// controls stay with the enclosing group.
pub fn build(
    tree: &ControlTree,
    registry: &dyn ParamRegistry,
    group_roots: &[ControlId],
) -> KnobMapper {
    let roots: HashSet<ControlId> = group_roots.iter().copied().collect();
    let mut mapper = KnobMapper::default();
    collect(&mut mapper, tree, registry, &roots, tree.root(), None);
    log::info!("{} knob group(s)", mapper.maps.len());
    mapper
}

fn collect(
    mapper: &mut KnobMapper,
    tree: &ControlTree,
    registry: &dyn ParamRegistry,
    roots: &HashSet<ControlId>,
    id: ControlId,
    enclosing: Option<KnobGroup>,
) {
    let mut opened = None;
    if roots.contains(&id) {
        match mapper.begin_group(id) {
            Ok(group) => opened = Some(group),
            Err(e) => log::warn!("{e}; its controls join the enclosing group"),
        }
    }
    let current = opened.or(enclosing);

    if let Some(group) = current
        && is_candidate(tree, registry, id)
    {
        match mapper.add_control(group, tree, id) {
            Ok(true) => {}
            Ok(false) => log::trace!("Range {id:?} is not knob-mapped"),
            Err(e) => log::warn!("{e}"),
        }
    }

    for &child in tree.children(id) {
        collect(mapper, tree, registry, roots, child, current);
    }

    if let Some(group) = opened
        && let Err(e) = mapper.end_group(group)
    {
        log::warn!("{e}");
    }
}

fn is_candidate(tree: &ControlTree, registry: &dyn ParamRegistry, id: ControlId) -> bool {
    let Some(control) = tree.get(id) else {
        return false;
    };
    let Some(name) = control.name.as_deref() else {
        return false;
    };
    matches!(
        control.kind.capability(),
        Some(Capability::Range | Capability::Choice | Capability::Toggle)
    ) && registry.find_index(params::parameter_id(name)).is_some()
}
