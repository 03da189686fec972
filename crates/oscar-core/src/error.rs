use http::StatusCode;
use thiserror::Error;

/// Failure talking to the package-metadata source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Transport(String),

    #[error("metadata response could not be decoded: {0}")]
    Decode(String),

    #[error("metadata source returned errors: {0}")]
    Upstream(String),

    #[error("metadata page claims more results but carries no cursor")]
    MissingCursor,

    #[error("gave up after {0} metadata pages")]
    TooManyPages(usize),
}

/// Failure talking to origin (object) storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Transport(String),

    #[error("storage returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("storage credentials unavailable: {0}")]
    Credentials(String),
}

/// Failure fetching a third-party module over plain HTTP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request for {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Failure reported by an external build tool (transpiler or bundler).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("could not start build tool: {0}")]
    Spawn(String),

    #[error("build tool failed: {0}")]
    Failed(String),

    #[error("build tool timed out after {0}s")]
    Timeout(u64),
}

/// Typed absence or failure from the version resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Package not found")]
    PackageNotFound,

    #[error("Version not found")]
    VersionNotFound,

    #[error(transparent)]
    Upstream(#[from] MetadataError),
}

/// Everything the import pipeline can fail with, mapped 1:1 to a status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OscarError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Package not found")]
    PackageNotFound,

    #[error("Version not found")]
    VersionNotFound,

    #[error("Upstream metadata failure: {0}")]
    UpstreamMetadata(MetadataError),

    #[error("Origin fetch failed: {0}")]
    OriginFetch(StorageError),

    #[error("File not found")]
    FileNotFound,

    #[error("Transpile failed: {0}")]
    Transpile(ToolError),

    #[error("Bundle failed: {0}")]
    Bundle(String),

    #[error("Cache store failed: {0}")]
    CacheStore(StorageError),
}

impl OscarError {
    pub fn status(&self) -> StatusCode {
        match self {
            OscarError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OscarError::PackageNotFound
            | OscarError::VersionNotFound
            | OscarError::FileNotFound => StatusCode::NOT_FOUND,
            OscarError::UpstreamMetadata(_) | OscarError::OriginFetch(_) => StatusCode::BAD_GATEWAY,
            OscarError::Transpile(_) | OscarError::Bundle(_) | OscarError::CacheStore(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ResolveError> for OscarError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::PackageNotFound => OscarError::PackageNotFound,
            ResolveError::VersionNotFound => OscarError::VersionNotFound,
            ResolveError::Upstream(e) => OscarError::UpstreamMetadata(e),
        }
    }
}
