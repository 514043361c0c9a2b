//! The session facade: random event selection, ban-after-use bookkeeping
//! and process-level reset.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashSet;
use std::fmt;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::{ConfigError, ToolkitConfig};
use crate::core::content::{ContentError, ContentLibrary};
use crate::core::event::{BuildContext, TextEvent};
use crate::core::hub::EventHub;
use crate::core::registry::{ActionModule, ActionRegistry, RegistryError};
use crate::schema::event::{EventDef, EventId};

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Which labels a random draw must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFilter {
    Any,
    /// At least one of these labels.
    AnyOf(Vec<String>),
    /// Every one of these labels.
    AllOf(Vec<String>),
}

impl LabelFilter {
    pub fn matches(&self, def: &EventDef) -> bool {
        match self {
            LabelFilter::Any => true,
            LabelFilter::AnyOf(labels) => labels.iter().any(|l| def.has_label(l)),
            LabelFilter::AllOf(labels) => labels.iter().all(|l| def.has_label(l)),
        }
    }

    fn labels(&self) -> &[String] {
        match self {
            LabelFilter::Any => &[],
            LabelFilter::AnyOf(labels) | LabelFilter::AllOf(labels) => labels,
        }
    }
}

/// Why a random draw came back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMiss {
    NoContent,
    UnknownLabel(String),
    AllBanned,
    PredicateExcludedAll,
}

impl fmt::Display for SelectionMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMiss::NoContent => write!(f, "no enabled content is loaded"),
            SelectionMiss::UnknownLabel(label) => {
                write!(f, "no enabled event carries the label '{}'", label)
            }
            SelectionMiss::AllBanned => write!(f, "every matching event is banned"),
            SelectionMiss::PredicateExcludedAll => {
                write!(f, "the filter excluded every event")
            }
        }
    }
}

pub struct TextEventToolkit {
    library: ContentLibrary,
    registry: Arc<ActionRegistry>,
    hub: Rc<EventHub>,
    config: ToolkitConfig,
    banned: FxHashSet<EventId>,
    last_event: Weak<TextEvent>,
    rng: StdRng,
}

/// Builder for constructing a `TextEventToolkit`.
pub struct TextEventToolkitBuilder {
    seed: u64,
    content_path: Option<String>,
    config_path: Option<String>,
    /// Directly provided content (for testing without files).
    library: Option<ContentLibrary>,
    registry: Option<ActionRegistry>,
    config: Option<ToolkitConfig>,
    hub: Option<Rc<EventHub>>,
}

impl fmt::Debug for TextEventToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEventToolkit")
            .field("events", &self.library.len())
            .field("banned", &self.banned)
            .field("registry", &self.registry)
            .finish()
    }
}

impl TextEventToolkit {
    pub fn builder() -> TextEventToolkitBuilder {
        TextEventToolkitBuilder {
            seed: 0,
            content_path: None,
            config_path: None,
            library: None,
            registry: None,
            config: None,
            hub: None,
        }
    }

    /// Draw a random enabled, unbanned event.
    pub fn create_random(&mut self) -> Option<Rc<TextEvent>> {
        self.select_random(&LabelFilter::Any, |_| true)
    }

    /// Draw among events carrying at least one of `labels`.
    pub fn create_random_with_label(&mut self, labels: &[&str]) -> Option<Rc<TextEvent>> {
        let filter = LabelFilter::AnyOf(labels.iter().map(|l| l.to_string()).collect());
        self.select_random(&filter, |_| true)
    }

    /// Draw among events carrying every one of `labels`.
    pub fn create_random_with_all_labels(&mut self, labels: &[&str]) -> Option<Rc<TextEvent>> {
        let filter = LabelFilter::AllOf(labels.iter().map(|l| l.to_string()).collect());
        self.select_random(&filter, |_| true)
    }

    pub fn create_random_where(
        &mut self,
        predicate: impl Fn(&EventDef) -> bool,
    ) -> Option<Rc<TextEvent>> {
        self.select_random(&LabelFilter::Any, predicate)
    }

    /// Draw uniformly among enabled, unbanned events matching both the
    /// label filter and the predicate. Returns `None` (and logs why) when
    /// nothing qualifies.
    pub fn select_random(
        &mut self,
        filter: &LabelFilter,
        predicate: impl Fn(&EventDef) -> bool,
    ) -> Option<Rc<TextEvent>> {
        let mut candidates: Vec<EventId> = self
            .library
            .enabled_events()
            .filter(|def| !self.banned.contains(&def.id))
            .filter(|def| filter.matches(def) && predicate(def))
            .map(|def| def.id)
            .collect();

        if candidates.is_empty() {
            let miss = self.diagnose_miss(filter, &predicate);
            warn!(target: "text_events::toolkit", reason = %miss, "no event could be selected");
            return None;
        }
        // Events that fail to build are dropped from this draw only.
        while let Some(&id) = candidates.choose(&mut self.rng) {
            if let Some(event) = self.instantiate(id) {
                return Some(event);
            }
            candidates.retain(|c| *c != id);
        }
        warn!(target: "text_events::toolkit", "no candidate event could be built");
        None
    }

    fn diagnose_miss(
        &self,
        filter: &LabelFilter,
        predicate: &impl Fn(&EventDef) -> bool,
    ) -> SelectionMiss {
        let enabled: Vec<&EventDef> = self.library.enabled_events().collect();
        if enabled.is_empty() {
            return SelectionMiss::NoContent;
        }
        if let Some(label) = filter
            .labels()
            .iter()
            .find(|l| !enabled.iter().any(|def| def.has_label(l)))
        {
            return SelectionMiss::UnknownLabel(label.clone());
        }
        let matching: Vec<&&EventDef> = enabled
            .iter()
            .filter(|def| filter.matches(def) && predicate(def))
            .collect();
        if !matching.is_empty() && matching.iter().all(|def| self.banned.contains(&def.id)) {
            SelectionMiss::AllBanned
        } else {
            SelectionMiss::PredicateExcludedAll
        }
    }

    /// Build the event with the given id, regardless of bans or its
    /// enabled flag.
    pub fn create_from_id(&mut self, id: EventId) -> Option<Rc<TextEvent>> {
        if !self.library.contains(id) {
            warn!(target: "text_events::toolkit", event = %id, "no event with this id");
            return None;
        }
        self.instantiate(id)
    }

    fn instantiate(&mut self, id: EventId) -> Option<Rc<TextEvent>> {
        let def = self.library.get(id)?;
        let ctx = BuildContext::new(Arc::clone(&self.registry), Rc::clone(&self.hub))
            .with_acknowledgment_text(self.config.default_acknowledgment_text.clone());
        let event = match TextEvent::instantiate(def, &ctx) {
            Ok(event) => event,
            Err(e) => {
                warn!(target: "text_events::toolkit", error = %e, "event could not be built");
                return None;
            }
        };
        if event.ban_after_use() {
            debug!(target: "text_events::toolkit", event = %id, "banned after use");
            self.banned.insert(id);
        }
        self.last_event = Rc::downgrade(&event);
        Some(event)
    }

    /// The most recently created event, while something still holds it.
    pub fn last_event(&self) -> Option<Rc<TextEvent>> {
        self.last_event.upgrade()
    }

    pub fn is_banned(&self, id: EventId) -> bool {
        self.banned.contains(&id)
    }

    pub fn banned(&self) -> &FxHashSet<EventId> {
        &self.banned
    }

    /// Process-level reset: exits every live event and clears the bans.
    pub fn reset(&mut self) {
        info!(target: "text_events::toolkit", banned = self.banned.len(), "session reset");
        self.hub.force_exit_all();
        self.banned.clear();
        self.last_event = Weak::new();
    }

    pub fn force_exit_all(&self) {
        self.hub.force_exit_all();
    }

    /// Rebuild the registry from `modules`, honoring the configured module
    /// overrides. Events already built keep the bindings they had.
    pub fn refresh_registry(
        &mut self,
        modules: &[&dyn ActionModule],
    ) -> Result<(), ToolkitError> {
        if self.hub.live_events() > 0 {
            warn!(
                target: "text_events::toolkit",
                live = self.hub.live_events(),
                "refreshing the registry while events are live"
            );
        }
        let registry = ActionRegistry::scan(
            modules,
            self.config.action_module.as_deref(),
            self.config.predicate_module.as_deref(),
        )?;
        self.registry = Arc::new(registry);
        Ok(())
    }

    pub fn library(&self) -> &ContentLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut ContentLibrary {
        &mut self.library
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Rc<EventHub> {
        &self.hub
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }
}

impl TextEventToolkitBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// RON content file or directory to load at build time.
    pub fn content_path(mut self, path: &str) -> Self {
        self.content_path = Some(path.to_string());
        self
    }

    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Provide content directly (for testing without files).
    pub fn with_library(mut self, library: ContentLibrary) -> Self {
        self.library = Some(library);
        self
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_config(mut self, config: ToolkitConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a hub with other toolkits or views.
    pub fn with_hub(mut self, hub: Rc<EventHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn build(self) -> Result<TextEventToolkit, ToolkitError> {
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ToolkitConfig::load_from_ron(Path::new(path))?,
            (None, None) => ToolkitConfig::default(),
        };

        let mut library = self.library.unwrap_or_default();
        if let Some(ref path) = self.content_path {
            for def in ContentLibrary::load_from_ron(Path::new(path))?.events() {
                library.insert(def.clone())?;
            }
        }

        let registry = self.registry.unwrap_or_default();
        info!(
            target: "text_events::toolkit",
            events = library.len(),
            actions = registry.action_identifiers().len(),
            predicates = registry.predicate_identifiers().len(),
            seed = self.seed,
            "toolkit ready"
        );

        Ok(TextEventToolkit {
            library,
            registry: Arc::new(registry),
            hub: self.hub.unwrap_or_else(EventHub::new),
            config,
            banned: FxHashSet::default(),
            last_event: Weak::new(),
            rng: StdRng::seed_from_u64(self.seed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::event::{ChoiceDef, OutcomeDef};

    fn library() -> ContentLibrary {
        ContentLibrary::from_events(vec![
            EventDef::new(EventId(1), "Toll Bridge")
                .with_label("road")
                .with_choice(ChoiceDef::new("Pay").with_result(OutcomeDef::ending())),
            EventDef::new(EventId(2), "Market Day")
                .with_label("town")
                .with_label("trade")
                .banned_after_use(),
            EventDef::new(EventId(3), "Broken Axle").with_label("road"),
        ])
        .unwrap()
    }

    fn toolkit() -> TextEventToolkit {
        TextEventToolkit::builder()
            .seed(7)
            .with_library(library())
            .build()
            .unwrap()
    }

    #[test]
    fn label_filters() {
        let def = EventDef::new(EventId(1), "x").with_label("a").with_label("b");
        assert!(LabelFilter::Any.matches(&def));
        assert!(LabelFilter::AnyOf(vec!["z".into(), "b".into()]).matches(&def));
        assert!(!LabelFilter::AllOf(vec!["a".into(), "z".into()]).matches(&def));
        assert!(LabelFilter::AllOf(vec!["a".into(), "b".into()]).matches(&def));
    }

    #[test]
    fn random_with_label_stays_in_label() {
        let mut toolkit = toolkit();
        for _ in 0..20 {
            let event = toolkit.create_random_with_label(&["road"]).unwrap();
            assert!(event.has_label("road"));
        }
    }

    #[test]
    fn ban_after_use_excludes_event() {
        let mut toolkit = toolkit();
        let event = toolkit.create_random_with_all_labels(&["town", "trade"]).unwrap();
        assert_eq!(event.id(), EventId(2));
        assert!(toolkit.is_banned(EventId(2)));
        assert!(toolkit.create_random_with_label(&["town"]).is_none());
        for _ in 0..20 {
            assert_ne!(toolkit.create_random().unwrap().id(), EventId(2));
        }
        toolkit.reset();
        assert!(toolkit.create_random_with_label(&["town"]).is_some());
    }

    #[test]
    fn create_from_id_ignores_bans() {
        let mut toolkit = toolkit();
        toolkit.create_from_id(EventId(2)).unwrap();
        assert!(toolkit.is_banned(EventId(2)));
        assert!(toolkit.create_from_id(EventId(2)).is_some());
        assert!(toolkit.create_from_id(EventId(99)).is_none());
    }

    #[test]
    fn miss_reasons() {
        let mut toolkit = toolkit();
        assert_eq!(
            toolkit.diagnose_miss(&LabelFilter::AnyOf(vec!["sea".into()]), &|_: &EventDef| true),
            SelectionMiss::UnknownLabel("sea".to_string())
        );
        toolkit.create_from_id(EventId(2));
        assert_eq!(
            toolkit.diagnose_miss(&LabelFilter::AnyOf(vec!["town".into()]), &|_: &EventDef| true),
            SelectionMiss::AllBanned
        );
        assert_eq!(
            toolkit.diagnose_miss(&LabelFilter::Any, &|_: &EventDef| false),
            SelectionMiss::PredicateExcludedAll
        );
        let empty = TextEventToolkit::builder().build().unwrap();
        assert_eq!(
            empty.diagnose_miss(&LabelFilter::Any, &|_: &EventDef| true),
            SelectionMiss::NoContent
        );
    }

    #[test]
    fn disabled_events_are_never_drawn() {
        let mut library = library();
        for id in [1, 2] {
            library.get_mut(EventId(id)).unwrap().enabled = false;
        }
        let mut toolkit = TextEventToolkit::builder().with_library(library).build().unwrap();
        for _ in 0..10 {
            assert_eq!(toolkit.create_random().unwrap().id(), EventId(3));
        }
        assert!(toolkit.create_from_id(EventId(1)).is_some());
    }

    #[test]
    fn last_event_tracks_latest() {
        let mut toolkit = toolkit();
        let event = toolkit.create_from_id(EventId(3)).unwrap();
        assert_eq!(toolkit.last_event().unwrap().id(), EventId(3));
        drop(event);
        assert!(toolkit.last_event().is_none());
    }

    #[test]
    fn reset_exits_live_events() {
        let mut toolkit = toolkit();
        let event = toolkit.create_from_id(EventId(1)).unwrap();
        event.enter();
        toolkit.reset();
        assert!(event.is_exited());
        assert!(toolkit.banned().is_empty());
    }

    #[test]
    fn invalid_event_is_skipped() {
        let library = ContentLibrary::from_events(vec![EventDef::new(EventId(1), "")]).unwrap();
        let mut toolkit = TextEventToolkit::builder().with_library(library).build().unwrap();
        assert!(toolkit.create_random().is_none());
    }

    #[test]
    fn draw_falls_through_to_a_buildable_event() {
        let library = ContentLibrary::from_events(vec![
            EventDef::new(EventId(1), ""),
            EventDef::new(EventId(2), ""),
            EventDef::new(EventId(3), "Ford"),
        ])
        .unwrap();
        for seed in 0..20 {
            let mut toolkit = TextEventToolkit::builder()
                .seed(seed)
                .with_library(library.clone())
                .build()
                .unwrap();
            assert_eq!(toolkit.create_random().unwrap().id(), EventId(3));
        }
    }

    #[test]
    fn seeded_draws_repeat() {
        let draw = |seed| {
            let mut toolkit = TextEventToolkit::builder()
                .seed(seed)
                .with_library(library())
                .build()
                .unwrap();
            (0..10)
                .map(|_| toolkit.create_random_with_label(&["road"]).unwrap().id())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }
}
