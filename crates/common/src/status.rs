// Save status state machine for an editor session.
//
//   saved → dirty → saving → saved
//                          → error → dirty (next edit) / saving (retry)
//
// Hydrating from the store never marks the session dirty, and a save
// requested while one is in flight is skipped rather than queued.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Saved,
    Dirty,
    Saving,
    Error,
}

impl SaveStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Dirty => "dirty",
            Self::Saving => "saving",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveTracker {
    status: SaveStatus,
    hydrated: bool,
    edited_during_save: bool,
    last_error: Option<String>,
}

impl SaveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Record a (re)load from the store. The in-memory state now equals the
    /// persisted state.
    pub fn hydrate(&mut self) {
        self.hydrated = true;
        self.status = SaveStatus::Saved;
        self.edited_during_save = false;
        self.last_error = None;
    }

    /// Record a user edit. Returns true when the edit should (re)arm the
    /// autosave timer.
    pub fn mark_edited(&mut self) -> bool {
        if !self.hydrated {
            return false;
        }
        match self.status {
            SaveStatus::Saving => self.edited_during_save = true,
            SaveStatus::Saved | SaveStatus::Dirty | SaveStatus::Error => {
                self.status = SaveStatus::Dirty;
            }
        }
        true
    }

    /// Try to enter `saving`. Returns false while a save is already running.
    pub fn begin_save(&mut self) -> bool {
        if self.status == SaveStatus::Saving {
            return false;
        }
        self.status = SaveStatus::Saving;
        self.edited_during_save = false;
        true
    }

    /// Leave `saving`. Edits made during the flush keep the session dirty.
    pub fn finish_save(&mut self, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => {
                self.last_error = None;
                self.status =
                    if self.edited_during_save { SaveStatus::Dirty } else { SaveStatus::Saved };
            }
            Err(message) => {
                self.last_error = Some(message);
                self.status = SaveStatus::Error;
            }
        }
        self.edited_during_save = false;
    }
}
