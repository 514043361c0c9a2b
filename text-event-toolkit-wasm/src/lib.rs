//! WASM bindings for text-event-toolkit — powers the in-browser event player.

use std::rc::Rc;
use wasm_bindgen::prelude::*;

use text_event_toolkit::core::config::ToolkitConfig;
use text_event_toolkit::core::content::ContentLibrary;
use text_event_toolkit::core::event::TextEvent;
use text_event_toolkit::core::playthrough::{Playthrough, Stage, Step};
use text_event_toolkit::core::registry::ActionRegistry;
use text_event_toolkit::core::state::StateModule;
use text_event_toolkit::core::toolkit::TextEventToolkit;
use text_event_toolkit::schema::event::EventId;

// ---------------------------------------------------------------------------
// Embedded content — compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const TOOLKIT_CONFIG: &str = include_str!("../../content/toolkit.ron");
    pub const CARAVAN_EVENTS: &str = include_str!("../../content/caravan/events.ron");
    pub const HAUNTED_INN_EVENTS: &str = include_str!("../../content/haunted_inn/events.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct ChoiceView {
    text: String,
    hover_text: String,
}

#[derive(serde::Serialize)]
struct PlayView {
    event_id: Option<u32>,
    title: String,
    body: String,
    stage: &'static str,
    outcome_text: Option<String>,
    post_text: Option<String>,
    acknowledgment_text: Option<String>,
    choices: Vec<ChoiceView>,
    messages: Vec<String>,
}

#[derive(serde::Serialize)]
struct EventSummary {
    id: u32,
    title: String,
    labels: Vec<String>,
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::AwaitingChoice => "awaiting_choice",
        Stage::ShowingOutcome => "showing_outcome",
        Stage::Finished => "finished",
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct WebSession {
    toolkit: TextEventToolkit,
    state: StateModule,
    play: Option<Playthrough>,
    post_text: Option<String>,
}

#[wasm_bindgen]
impl WebSession {
    /// Create a session over one of the bundled stories.
    #[wasm_bindgen(constructor)]
    pub fn new(story: &str, seed: u64) -> Result<WebSession, JsError> {
        let events = match story {
            "caravan" => data::CARAVAN_EVENTS,
            "haunted_inn" => data::HAUNTED_INN_EVENTS,
            _ => return Err(JsError::new(&format!("Unknown story: {story}"))),
        };
        Self::from_ron(events, seed)
    }

    /// Create a session over author-supplied RON content.
    pub fn from_ron(events_ron: &str, seed: u64) -> Result<WebSession, JsError> {
        let library = ContentLibrary::parse_ron(events_ron)
            .map_err(|e| JsError::new(&format!("Content parse error: {e}")))?;
        let config = ToolkitConfig::parse_ron(data::TOOLKIT_CONFIG)
            .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;

        let state = StateModule::new();
        let registry = ActionRegistry::scan(&[&state], None, None)
            .map_err(|e| JsError::new(&format!("Registry error: {e}")))?;

        let toolkit = TextEventToolkit::builder()
            .seed(seed)
            .with_library(library)
            .with_registry(registry)
            .with_config(config)
            .build()
            .map_err(|e| JsError::new(&format!("Toolkit build error: {e}")))?;

        Ok(WebSession {
            toolkit,
            state,
            play: None,
            post_text: None,
        })
    }

    /// Return a JSON array of the stories bundled into the binary.
    pub fn available_stories() -> String {
        serde_json::to_string(&["caravan", "haunted_inn"]).unwrap_or_else(|_| "[]".to_string())
    }

    /// Return a JSON array of `{ id, title, labels }` for enabled events.
    pub fn list_events(&self) -> Result<String, JsError> {
        let events: Vec<EventSummary> = self
            .toolkit
            .library()
            .enabled_events()
            .map(|def| EventSummary {
                id: def.id.0,
                title: def.title.clone(),
                labels: def.labels.clone(),
            })
            .collect();
        to_json(&events)
    }

    /// Draw a random event. `labels_json` is a JSON array of labels, any
    /// of which may match; an empty array draws from everything.
    pub fn draw(&mut self, labels_json: &str) -> Result<String, JsError> {
        let labels: Vec<String> = serde_json::from_str(labels_json)
            .map_err(|e| JsError::new(&format!("Invalid labels JSON: {e}")))?;
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let event = if labels.is_empty() {
            self.toolkit.create_random()
        } else {
            self.toolkit.create_random_with_label(&labels)
        };
        let event = event.ok_or_else(|| JsError::new("No event could be drawn"))?;
        self.start(event)
    }

    /// Start the event with the given id, ignoring bans.
    pub fn play(&mut self, id: u32) -> Result<String, JsError> {
        let event = self
            .toolkit
            .create_from_id(EventId(id))
            .ok_or_else(|| JsError::new(&format!("Event {id} could not be started")))?;
        self.start(event)
    }

    /// Take the offered choice at `index`.
    pub fn choose(&mut self, index: usize) -> Result<String, JsError> {
        let play = self
            .play
            .as_mut()
            .ok_or_else(|| JsError::new("No event is running"))?;
        self.post_text = match play.choose(index) {
            Step::Outcome { post_text, .. } => post_text,
            Step::Ended => None,
            Step::Ignored => return Err(JsError::new(&format!("No choice at index {index}"))),
        };
        self.view()
    }

    /// Dismiss the outcome being shown.
    pub fn acknowledge(&mut self) -> Result<String, JsError> {
        if let Some(play) = self.play.as_mut() {
            play.acknowledge();
        }
        self.post_text = None;
        self.view()
    }

    /// Return a JSON snapshot of the running event.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "event_id": 1,
    ///   "title": "Toll Bridge",
    ///   "body": "...",
    ///   "stage": "awaiting_choice",
    ///   "outcome_text": null,
    ///   "post_text": null,
    ///   "acknowledgment_text": null,
    ///   "choices": [{ "text": "Pay the toll", "hover_text": "Costs 3 gold" }],
    ///   "messages": []
    /// }
    /// ```
    pub fn view(&self) -> Result<String, JsError> {
        let messages = self.state.take_messages();
        let Some(play) = self.play.as_ref() else {
            return to_json(&PlayView {
                event_id: None,
                title: String::new(),
                body: String::new(),
                stage: stage_label(Stage::Finished),
                outcome_text: None,
                post_text: None,
                acknowledgment_text: None,
                choices: Vec::new(),
                messages,
            });
        };

        let event = play.event();
        let outcome = play.current_outcome();
        to_json(&PlayView {
            event_id: Some(event.id().0),
            title: event.title().to_string(),
            body: event.body().to_string(),
            stage: stage_label(play.stage()),
            outcome_text: outcome.map(|o| o.text().to_string()),
            post_text: self.post_text.clone(),
            acknowledgment_text: outcome.map(|o| o.acknowledgment_text().to_string()),
            choices: play
                .offered_choices()
                .iter()
                .map(|c| ChoiceView {
                    text: c.text().to_string(),
                    hover_text: c.hover_text().to_string(),
                })
                .collect(),
            messages,
        })
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.state.counter(name)
    }

    pub fn set_counter(&self, name: &str, value: i64) {
        self.state.set_counter(name, value);
    }

    pub fn flag(&self, name: &str) -> bool {
        self.state.flag(name)
    }

    pub fn set_flag(&self, name: &str, on: bool) {
        self.state.set_flag(name, on);
    }

    /// End any running event and clear bans.
    pub fn reset(&mut self) {
        self.play = None;
        self.post_text = None;
        self.toolkit.reset();
    }
}

impl WebSession {
    fn start(&mut self, event: Rc<TextEvent>) -> Result<String, JsError> {
        if let Some(mut previous) = self.play.take() {
            previous.abandon();
        }
        self.post_text = None;
        self.play = Some(Playthrough::start(event));
        self.view()
    }
}
