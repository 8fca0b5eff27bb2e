// src/logpipeline/mod.rs

//! Batched async access-log sink with retention GC (spec.md section 4.F).

pub mod gc;
pub mod writer;

pub use gc::RetentionGcTask;
pub use writer::{bounded_channel, AccessLogSender, LogWriterTask};
