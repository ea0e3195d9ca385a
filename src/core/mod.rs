//! Shared data model

pub mod note;

pub use note::{DeletedNote, Note, StoreStats, DEFAULT_CATEGORY};
