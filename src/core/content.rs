//! Authored event content: loading, persisting and editing definitions.

use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::ToolkitConfig;
use crate::core::registry::ActionRegistry;
use crate::core::validate::{self, Severity};
use crate::schema::event::{EventDef, EventId, OutcomeDef};
use crate::schema::call::SerializedCall;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
    #[error("duplicate event id: {0}")]
    DuplicateId(EventId),
    #[error("content has {count} error(s); first: {first}")]
    Invalid { count: usize, first: String },
}

/// Something that can hand out event definitions.
pub trait ContentSource {
    fn load_all(&self) -> Result<Vec<EventDef>, ContentError>;

    fn load_by_id(&self, id: EventId) -> Result<Option<EventDef>, ContentError> {
        Ok(self.load_all()?.into_iter().find(|def| def.id == id))
    }
}

/// Event definitions stored as RON lists, in one file or a directory tree
/// of `*.ron` files.
#[derive(Debug, Clone)]
pub struct RonContentSource {
    path: PathBuf,
}

impl RonContentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for RonContentSource {
    fn load_all(&self) -> Result<Vec<EventDef>, ContentError> {
        if !self.path.is_dir() {
            return parse_event_list(&std::fs::read_to_string(&self.path)?);
        }
        let mut files = Vec::new();
        collect_ron_files(&self.path, &mut files)?;
        let mut events = Vec::new();
        for file in files {
            debug!(target: "text_events::content", path = %file.display(), "loading content file");
            events.extend(parse_event_list(&std::fs::read_to_string(&file)?)?);
        }
        Ok(events)
    }
}

fn parse_event_list(input: &str) -> Result<Vec<EventDef>, ContentError> {
    Ok(ron::from_str(input)?)
}

/// Recursively gathers `*.ron` files, sorted by path within each directory.
fn collect_ron_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ContentError> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_ron_files(&path, out)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            out.push(path);
        }
    }
    Ok(())
}

/// The in-memory set of authored events, keyed by their unique id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentLibrary {
    events: Vec<EventDef>,
}

impl ContentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library, rejecting duplicate ids.
    pub fn from_events(events: Vec<EventDef>) -> Result<Self, ContentError> {
        let mut library = Self::new();
        for def in events {
            library.insert(def)?;
        }
        Ok(library)
    }

    pub fn load(source: &dyn ContentSource) -> Result<Self, ContentError> {
        let library = Self::from_events(source.load_all()?)?;
        info!(target: "text_events::content", events = library.len(), "content loaded");
        Ok(library)
    }

    /// Load a library from a RON file or a directory of RON files.
    pub fn load_from_ron(path: &Path) -> Result<Self, ContentError> {
        Self::load(&RonContentSource::new(path))
    }

    /// Parse a library from a RON string holding a list of events.
    pub fn parse_ron(input: &str) -> Result<Self, ContentError> {
        Self::from_events(parse_event_list(input)?)
    }

    pub fn to_ron(&self) -> Result<String, ContentError> {
        Ok(ron::ser::to_string_pretty(
            &self.events,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Write the library to `path`. Refuses when validation reports errors;
    /// pass a registry to also check calls against registered signatures.
    pub fn save_to_ron(
        &self,
        path: &Path,
        registry: Option<&ActionRegistry>,
    ) -> Result<(), ContentError> {
        let errors: Vec<_> = validate::validate_library(self, registry)
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        if let Some(first) = errors.first() {
            return Err(ContentError::Invalid {
                count: errors.len(),
                first: first.to_string(),
            });
        }
        std::fs::write(path, self.to_ron()?)?;
        info!(target: "text_events::content", path = %path.display(), events = self.len(), "content saved");
        Ok(())
    }

    pub fn events(&self) -> &[EventDef] {
        &self.events
    }

    /// Events that may be drawn at random.
    pub fn enabled_events(&self) -> impl Iterator<Item = &EventDef> {
        self.events.iter().filter(|def| def.enabled)
    }

    pub fn get(&self, id: EventId) -> Option<&EventDef> {
        self.events.iter().find(|def| def.id == id)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut EventDef> {
        self.events.iter_mut().find(|def| def.id == id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn insert(&mut self, def: EventDef) -> Result<(), ContentError> {
        if self.contains(def.id) {
            return Err(ContentError::DuplicateId(def.id));
        }
        self.events.push(def);
        Ok(())
    }

    /// Insert or replace the definition with the same id, e.g. one written
    /// back from a live event.
    pub fn upsert(&mut self, def: EventDef) {
        match self.get_mut(def.id) {
            Some(existing) => *existing = def,
            None => self.events.push(def),
        }
    }

    pub fn highest_id(&self) -> Option<EventId> {
        self.events.iter().map(|def| def.id).max()
    }

    /// Create a blank event with the next free id, seeded from the
    /// configured authoring defaults.
    pub fn new_event(&mut self, config: &ToolkitConfig) -> &mut EventDef {
        let id = match self.highest_id() {
            None => EventId(0),
            Some(EventId(n)) => match n.checked_add(1) {
                Some(next) => EventId(next),
                None => self.lowest_free_id(),
            },
        };
        let mut def = EventDef::new(id, "New event");
        def.ban_after_use = config.ban_by_default;
        if config.default_first_label {
            if let Some(label) = config.labels.first() {
                def.add_label(label.clone());
            }
        }
        self.events.push(def);
        let last = self.events.len() - 1;
        &mut self.events[last]
    }

    fn lowest_free_id(&self) -> EventId {
        let used: FxHashSet<EventId> = self.events.iter().map(|def| def.id).collect();
        (0..=u32::MAX)
            .map(EventId)
            .find(|id| !used.contains(id))
            .unwrap_or(EventId(0))
    }

    pub fn remove_event(&mut self, id: EventId) -> Option<EventDef> {
        let index = self.events.iter().position(|def| def.id == id)?;
        Some(self.events.remove(index))
    }

    /// "Title (id)" for each event, debug events only when asked for.
    pub fn titles_with_ids(&self, include_debug: bool) -> Vec<String> {
        self.events
            .iter()
            .filter(|def| include_debug || !def.debug)
            .map(|def| format!("{} ({})", def.title, def.id))
            .collect()
    }

    /// Rebuild every stored call's arguments against the registry's current
    /// signatures. Returns the number of calls that changed.
    pub fn conform_calls(&mut self, registry: &ActionRegistry) -> usize {
        let mut changed = 0;
        for def in &mut self.events {
            let id = def.id;
            for_each_call(def, &mut |call, is_predicate| {
                let entry = if is_predicate {
                    registry.predicate(&call.name).map(|e| &e.signature)
                } else {
                    registry.action(&call.name).map(|e| &e.signature)
                };
                match entry {
                    Some(signature) => {
                        if call.conform(&signature.params) {
                            changed += 1;
                        }
                    }
                    None if call.is_valid() => warn!(
                        target: "text_events::content",
                        event = %id,
                        call = %call.name,
                        "call does not match any registered callback; left unchanged"
                    ),
                    None => {}
                }
            });
        }
        if changed > 0 {
            info!(target: "text_events::content", changed, "stored calls conformed to registry");
        }
        changed
    }
}

/// Visits every call in an event: outcome actions (`false`) and choice
/// conditions (`true`), depth first.
fn for_each_call(def: &mut EventDef, visit: &mut dyn FnMut(&mut SerializedCall, bool)) {
    if let Some(entry) = &mut def.entry_outcome {
        visit_outcome(entry, visit);
    }
    for choice in &mut def.choices {
        if let Some(condition) = &mut choice.condition {
            visit(condition, true);
        }
        for result in &mut choice.results {
            visit_outcome(result, visit);
        }
    }
}

fn visit_outcome(outcome: &mut OutcomeDef, visit: &mut dyn FnMut(&mut SerializedCall, bool)) {
    for action in &mut outcome.actions {
        visit(action, false);
    }
    for choice in &mut outcome.choices {
        if let Some(condition) = &mut choice.condition {
            visit(condition, true);
        }
        for result in &mut choice.results {
            visit_outcome(result, visit);
        }
    }
}
