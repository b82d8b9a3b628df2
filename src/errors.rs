/// Error kinds surfaced by the copier.
///
/// None of these trigger a retry of a copy operation: `Connection` aborts
/// startup, the rest are logged and the poll loop keeps running.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("fill listing failed: {0}")]
    Listing(String),

    #[error("unknown fill side: {0:?}")]
    UnknownSide(String),

    #[error("order submission failed: {0}")]
    Submission(String),
}
