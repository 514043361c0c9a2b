//! Runtime: the action registry, live events and the session facade.

pub mod call;
pub mod choice;
pub mod config;
pub mod content;
pub mod event;
pub mod hub;
pub mod outcome;
pub mod playthrough;
pub mod registry;
pub mod signal;
pub mod state;
pub mod toolkit;
pub mod validate;
