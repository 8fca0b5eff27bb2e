// src/alert/mod.rs

//! The alert dispatcher: channel adapters, message rendering, and the
//! ingest/send/cleanup worker pipeline (spec.md section 4.G).

pub mod channels;
pub mod cleanupworker;
pub mod dispatcher;
pub mod flushworker;
pub mod ingest;
pub mod manager;
pub mod sendworker;
pub mod template;

pub use channels::AlertChannel;
pub use cleanupworker::CleanupWorker;
pub use dispatcher::{AlertDispatcher, AlertDispatcherConfig};
pub use flushworker::FlushWorker;
pub use ingest::{bounded_channel, AlertBuffer, AlertEmitter, IngestWorker};
pub use manager::ChannelManager;
pub use sendworker::SendWorker;
