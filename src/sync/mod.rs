//! Getting results off the machine: backend submission and replays

pub mod replay;
pub mod submitter;

pub use replay::{RecordedIntents, ReplayBundle, ReplayManager, REPLAY_FORMAT_VERSION};
pub use submitter::{
    detect_divergence, Backoff, Divergence, HttpTransport, ResultSubmitter, ResultTransport,
    SubmissionBundle, SubmissionOutcome, SubmissionResponse,
};
