//! State management module
//!
//! Handles bookmark tracking and checkpointing between runs, plus the
//! in-run store that lets one stream seed another.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - the checkpoint document, one bookmark map per stream
//! - `StateManager` - file-backed persistence with monotonic advances
//! - `SharedState` - activity candidates, submission forms and the contacts window

mod manager;
mod shared;
mod types;

pub use manager::StateManager;
pub use shared::{SharedState, ACTIVITY_PROPERTIES, FORM_SUBMISSIONS_PROPERTY};
pub use types::{State, StreamBookmark};
