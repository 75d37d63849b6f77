//! # draftloops-core
//!
//! The draft/grade/revise loop. A [`Session`] holds one topic, its source
//! digest and the drafts written so far; [`LoopRunner`] drives it with a
//! [`Generator`] and a [`draftloops_critic::Critic`] until a draft clears the
//! threshold or the iteration cap is reached.

mod digest;
mod error;
mod generator;
mod loop_runner;
mod outcome;
mod prompts;
mod record;
mod session;

pub use digest::{DigestError, DigestExport, EpisodeSummary, SourceDigest, SourceRef};
pub use error::{ConfigError, LoopError};
pub use generator::{oracle_label, Feedback, Generator, OracleGenerator};
pub use loop_runner::LoopRunner;
pub use outcome::{SessionOutcome, SessionStatus};
pub use prompts::WriterPrompts;
pub use record::SessionRecord;
pub use session::{
    Draft, HistoryEntry, Session, SessionConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_THRESHOLD,
};
