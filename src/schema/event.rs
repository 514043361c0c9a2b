use serde::{Deserialize, Serialize};
use std::fmt;

use super::call::SerializedCall;
use super::value::AssetRef;

/// Default weight ("chance") of an outcome that does not specify one.
pub const DEFAULT_WEIGHT: f32 = 100.0;

fn default_weight() -> f32 {
    DEFAULT_WEIGHT
}

fn default_enabled() -> bool {
    true
}

/// Stable identifier of an authored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authored definition of a dialogue node. This is the record the content
/// loader yields and the persister writes; live events are built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    pub id: EventId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media: Option<AssetRef>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub ban_after_use: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Debug events are hidden from title listings unless asked for.
    #[serde(default)]
    pub debug: bool,
    /// Legacy automatic outcome executed when the event is entered.
    #[serde(default)]
    pub entry_outcome: Option<OutcomeDef>,
    #[serde(default)]
    pub choices: Vec<ChoiceDef>,
}

impl EventDef {
    pub fn new(id: EventId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: String::new(),
            media: None,
            labels: Vec::new(),
            ban_after_use: false,
            enabled: true,
            debug: false,
            entry_outcome: None,
            choices: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.add_label(label);
        self
    }

    pub fn with_choice(mut self, choice: ChoiceDef) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn banned_after_use(mut self) -> Self {
        self.ban_after_use = true;
        self
    }

    pub fn add_choice(&mut self, choice: ChoiceDef) -> &mut ChoiceDef {
        self.choices.push(choice);
        let last = self.choices.len() - 1;
        &mut self.choices[last]
    }

    pub fn remove_choice(&mut self, index: usize) -> Option<ChoiceDef> {
        (index < self.choices.len()).then(|| self.choices.remove(index))
    }

    /// Adds a label unless already present.
    pub fn add_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l != label);
        self.labels.len() != before
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Authored definition of a player-facing option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDef {
    pub text: String,
    #[serde(default)]
    pub hover_text: String,
    #[serde(default)]
    pub post_text: String,
    /// Predicate gating eligibility. A missing or nameless call means the
    /// choice is always offered.
    #[serde(default)]
    pub condition: Option<SerializedCall>,
    #[serde(default)]
    pub results: Vec<OutcomeDef>,
}

impl Default for ChoiceDef {
    fn default() -> Self {
        Self::new("New choice")
    }
}

impl ChoiceDef {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hover_text: String::new(),
            post_text: String::new(),
            condition: None,
            results: Vec::new(),
        }
    }

    pub fn with_result(mut self, result: OutcomeDef) -> Self {
        self.results.push(result);
        self
    }

    pub fn with_condition(mut self, condition: SerializedCall) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_hover_text(mut self, hover_text: impl Into<String>) -> Self {
        self.hover_text = hover_text.into();
        self
    }

    pub fn with_post_text(mut self, post_text: impl Into<String>) -> Self {
        self.post_text = post_text.into();
        self
    }

    pub fn add_result(&mut self, result: OutcomeDef) -> &mut OutcomeDef {
        self.results.push(result);
        let last = self.results.len() - 1;
        &mut self.results[last]
    }

    pub fn remove_result(&mut self, index: usize) -> Option<OutcomeDef> {
        (index < self.results.len()).then(|| self.results.remove(index))
    }

    /// Installs an empty condition for the author to fill in.
    pub fn create_condition(&mut self) -> &mut SerializedCall {
        self.condition.insert(SerializedCall::default())
    }

    pub fn remove_condition(&mut self) {
        self.condition = None;
    }
}

/// Authored definition of one weighted outcome of a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDef {
    /// Narrative text. Empty text marks the outcome as final.
    #[serde(default)]
    pub text: String,
    /// Label of the button dismissing the text; the configured default
    /// applies when absent.
    #[serde(default)]
    pub acknowledgment_text: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub actions: Vec<SerializedCall>,
    #[serde(default)]
    pub choices: Vec<ChoiceDef>,
}

impl Default for OutcomeDef {
    fn default() -> Self {
        Self::new("")
    }
}

impl OutcomeDef {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            acknowledgment_text: None,
            weight: DEFAULT_WEIGHT,
            actions: Vec::new(),
            choices: Vec::new(),
        }
    }

    /// A final outcome: no text, ends its branch.
    pub fn ending() -> Self {
        Self::new("")
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_action(mut self, action: SerializedCall) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_choice(mut self, choice: ChoiceDef) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_acknowledgment_text(mut self, text: impl Into<String>) -> Self {
        self.acknowledgment_text = Some(text.into());
        self
    }

    pub fn is_final(&self) -> bool {
        self.text.is_empty()
    }

    pub fn add_action(&mut self, action: SerializedCall) -> &mut SerializedCall {
        self.actions.push(action);
        let last = self.actions.len() - 1;
        &mut self.actions[last]
    }

    pub fn remove_action(&mut self, index: usize) -> Option<SerializedCall> {
        (index < self.actions.len()).then(|| self.actions.remove(index))
    }

    pub fn add_choice(&mut self, choice: ChoiceDef) -> &mut ChoiceDef {
        self.choices.push(choice);
        let last = self.choices.len() - 1;
        &mut self.choices[last]
    }

    pub fn remove_choice(&mut self, index: usize) -> Option<ChoiceDef> {
        (index < self.choices.len()).then(|| self.choices.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::ArgValue;

    #[test]
    fn event_creation() {
        let event = EventDef::new(EventId(7), "Roadside Shrine")
            .with_body("A mossy shrine leans by the road.")
            .with_label("road")
            .with_choice(
                ChoiceDef::new("Leave an offering")
                    .with_result(OutcomeDef::new("The moss glows faintly.").with_weight(3.0))
                    .with_result(OutcomeDef::ending()),
            );
        assert_eq!(event.id, EventId(7));
        assert!(event.enabled);
        assert_eq!(event.choices.len(), 1);
        assert_eq!(event.choices[0].results.len(), 2);
        assert!(!event.choices[0].results[0].is_final());
        assert!(event.choices[0].results[1].is_final());
    }

    #[test]
    fn labels_are_deduplicated() {
        let mut event = EventDef::new(EventId(1), "Camp");
        event.add_label("night");
        event.add_label("night");
        assert_eq!(event.labels, vec!["night".to_string()]);
        assert!(event.remove_label("night"));
        assert!(!event.remove_label("night"));
    }

    #[test]
    fn mutation_api() {
        let mut choice = ChoiceDef::default();
        assert_eq!(choice.text, "New choice");
        choice.add_result(OutcomeDef::new("first"));
        choice.add_result(OutcomeDef::new("second"));
        assert_eq!(choice.remove_result(0).map(|r| r.text), Some("first".to_string()));
        assert!(choice.remove_result(5).is_none());

        choice.create_condition().name = "has_key".to_string();
        assert_eq!(choice.condition.as_ref().map(|c| c.name.as_str()), Some("has_key"));
        choice.remove_condition();
        assert!(choice.condition.is_none());

        let outcome = choice.add_result(OutcomeDef::new("third"));
        outcome.add_action(SerializedCall::new("give_gold", vec![ArgValue::Int(3)]));
        assert_eq!(outcome.actions.len(), 1);
        assert!(outcome.remove_action(0).is_some());
    }

    #[test]
    fn ron_defaults_fill_optional_fields() {
        let event: EventDef = ron::from_str(
            r#"(
                id: EventId(3),
                title: "Ferry",
                choices: [
                    (text: "Pay the ferryman", results: [(text: "He nods.")]),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(event.body, "");
        assert!(event.enabled);
        assert!(!event.ban_after_use);
        assert_eq!(event.choices[0].results[0].weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn missing_title_is_a_load_error() {
        let parsed: Result<EventDef, _> = ron::from_str("(id: EventId(3))");
        assert!(parsed.is_err());
    }
}
