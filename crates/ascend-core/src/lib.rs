//! # Ascend Core Library
//!
//! Focus-session engine for community servers: members start timed focus
//! sessions, and each completed session feeds a progression system of XP,
//! levels, daily streaks and study-time badges.
//!
//! The library owns the engine; the `ascend-cli` binary and any chat-platform
//! front end are thin layers over it.
//!
//! ## Architecture
//!
//! - **Focus**: cooldown gate, active-session registry with cancellable
//!   completion timers, and the completion pipeline
//! - **Progression**: pure XP / level / streak / badge rules
//! - **Storage**: SQLite (or in-memory) progression records and session log,
//!   TOML configuration
//! - **Integrations**: notification sinks and badge side effects (Discord)
//!
//! ## Key Components
//!
//! - [`FocusService`]: start / cancel / inspect focus sessions
//! - [`CompletionPipeline`]: turns a fired session into progression
//! - [`Database`]: progression persistence
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod focus;
pub mod integrations;
pub mod progression;
pub mod stats;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{
    ConfigError, HookError, PipelineError, ReportError, SinkError, StartError, StoreError,
};
pub use events::Notification;
pub use focus::{
    ActiveSessionView, CompletedSession, CompletionOutcome, CompletionPipeline, CompletionStage,
    CooldownGate, FocusService, SessionHandle, SessionRegistry,
};
pub use progression::{BadgeDefinition, ProgressionRules};
pub use stats::{LeaderboardEntry, UserStats, WeeklyReport, WeeklyReporter};
pub use storage::{Config, Database, MemoryStore};
