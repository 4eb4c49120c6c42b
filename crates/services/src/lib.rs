#![forbid(unsafe_code)]

pub mod archive;
pub mod collection;
pub mod config;
pub mod conversation;
pub mod error;
pub mod export;
pub mod sync;

pub use collect_core::Clock;

pub use archive::{ArchivalService, HttpArchivalService, UploadReceipt, UploadRequest};
pub use collection::{CollectionFlow, FlowServices, FlowStep};
pub use config::RemoteConfig;
pub use conversation::{
    CompletionSummary, ConversationService, HttpConversationService, RemoteTurn, SessionStart,
};
pub use error::{CollectionError, ExportError, RemoteError, SyncError};
pub use export::{ExportOptions, ExportPipeline, LocalExport};
pub use sync::{CleanupOutcome, Replay, SessionSynchronizer, StartedSession};
