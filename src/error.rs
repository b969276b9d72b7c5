use std::io;

/// Failure of the byte source or of an output sink.
///
/// Malformed transport stream data is never reported as an error; it is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed reading transport stream: {0}")]
    Read(#[from] io::Error),
    /// writing proxied stream data, or `show()` output, failed
    #[error("failed writing output: {0}")]
    Write(#[source] io::Error),
}
