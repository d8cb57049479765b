use std::io;

/// Top-level server errors. Per-connection failures never surface
/// here — a broken socket only ends its own handler task, and a failed
/// accept is logged and retried.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
}
