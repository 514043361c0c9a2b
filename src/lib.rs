//! Text Event Toolkit — branching dialogue for games.
//!
//! Authored events offer choices; each choice draws one of its weighted
//! outcomes, runs the outcome's registered actions and either branches
//! into further choices or ends the event. Choices can be gated by
//! registered predicates evaluated when the event is built.

pub mod core;
pub mod schema;
