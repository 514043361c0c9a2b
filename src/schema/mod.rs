//! Authored data records: what content files contain and what the
//! persister writes back.

pub mod call;
pub mod event;
pub mod value;
