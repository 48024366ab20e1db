//! Focus session lifecycle: cooldowns, the active-session registry, and the
//! completion pipeline that turns a finished session into progression.

mod cooldown;
mod pipeline;
mod registry;
mod service;

pub use cooldown::CooldownGate;
pub use pipeline::{CompletionOutcome, CompletionPipeline};
pub use registry::{ActiveSessionView, CompletedSession, SessionHandle, SessionRegistry};
pub use service::{FocusService, FOCUS_ACTION};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session is in its completion lifecycle.
///
/// `Armed -> Firing -> Persisting -> Notifying -> Done`; `Cancelled` is only
/// reachable from `Armed`. Logged as the `stage` field at each transition and
/// carried by [`crate::PipelineError`]: `Firing` when the user record could
/// not be loaded, `Persisting` when it could not be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStage {
    Armed,
    Firing,
    Persisting,
    Notifying,
    Done,
    Cancelled,
}

impl fmt::Display for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionStage::Armed => "armed",
            CompletionStage::Firing => "firing",
            CompletionStage::Persisting => "persisting",
            CompletionStage::Notifying => "notifying",
            CompletionStage::Done => "done",
            CompletionStage::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
