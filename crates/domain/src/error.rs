/// Shared error type for config loading and other cross-cutting domain concerns.
///
/// Codec faults, link faults, and API faults live in their own crates
/// (`i3g-wire::WireError`, `i3g-router-link::LinkError`, `i3g-gateway`'s
/// `ApiError`); this type covers what's common to all of them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
