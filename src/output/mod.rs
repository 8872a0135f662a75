//! Incremental output documents shared between callers

pub mod lock;
pub mod session;
pub mod sink;

pub use lock::FairLock;
pub use session::{OutputOptions, OutputSession, SessionState, SessionWriter, WriterGuard, WriterHandle};
pub use sink::{FileSink, MemorySink, Sink};
