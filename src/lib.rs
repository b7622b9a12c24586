//! Gamification Engine — declarative course gamification for e-learning.
//!
//! Courses script their gamification as JSON dialogs attached to lifecycle
//! events. The engine parses and validates those scripts against the course's
//! variable/achievement catalogs, compiles a course tree into a client-ready
//! manifest with pre-resolved hero emotion assets, and at runtime routes
//! lifecycle events through a per-session bus to dialog playbacks whose side
//! effects feed scores and achievements back into the user's progress record.

pub mod core;
pub mod schema;
