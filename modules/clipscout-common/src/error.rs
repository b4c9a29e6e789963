use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipScoutError {
    /// Invalid run options. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Neither the search service nor the content source produced anything usable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Export error: {0}")]
    Export(String),
}
