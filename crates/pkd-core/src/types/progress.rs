//! Progress events and the throttle that decides when to emit them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Decoding the bundle
    Parsing,
    /// Pass 1, authorities
    ValidatingAuthorities,
    /// Pass 2, dependents
    ValidatingDependents,
    /// Bundle done
    Completed,
    /// Bundle aborted
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parsing => "parsing",
            Self::ValidatingAuthorities => "validating_authorities",
            Self::ValidatingDependents => "validating_dependents",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot pushed to a progress sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Upload being processed
    pub upload_id: String,
    /// Current stage
    pub stage: Stage,
    /// Items done so far in this stage
    pub processed: usize,
    /// Expected items in this stage, when known
    pub total: Option<usize>,
    /// Free-form detail
    pub message: Option<String>,
}

impl ProgressEvent {
    /// Event without a message.
    #[must_use]
    pub fn new(
        upload_id: impl Into<String>,
        stage: Stage,
        processed: usize,
        total: Option<usize>,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            stage,
            processed,
            total,
            message: None,
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Counts items and says when an event is due, every `interval` items.
#[derive(Debug, Clone)]
pub struct ProgressTicker {
    interval: usize,
    count: usize,
}

impl ProgressTicker {
    /// Ticker firing every `interval` items; `0` is treated as `1`.
    #[must_use]
    pub const fn new(interval: usize) -> Self {
        Self {
            interval: if interval == 0 { 1 } else { interval },
            count: 0,
        }
    }

    /// Count one item. Returns the running count when an event is due.
    pub fn tick(&mut self) -> Option<usize> {
        self.count += 1;
        if self.count % self.interval == 0 {
            Some(self.count)
        } else {
            None
        }
    }

    /// Items counted so far.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }
}
