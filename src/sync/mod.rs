//! Offline sync engine (§4.6): reconciles local and remote calendar state
//! through the [`crate::client::CalDavClient`] without owning any
//! particular storage backend — callers persist [`engine::CalendarSyncState`]
//! however they like (it's `serde`-round-trippable) and drive `pull`/`push`
//! on whatever schedule suits them.

pub mod conflict;
pub mod engine;
pub mod queue;

pub use conflict::{ConflictStrategy, Resolution, resolve};
pub use engine::{
    CalendarSyncState, ChangeEvent, DeadLetter, PushReport, SyncObserver, SyncWindow, pull, push,
};
pub use queue::{Op, coalesce};
