use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SeekerError {
    #[error("invalid year for {flag}: {value}")]
    #[diagnostic(help("years must be numeric, e.g. 2022"))]
    InvalidYear { flag: String, value: String },

    #[error("must provide organism or records, but not both")]
    InvalidReportArguments,

    #[error("invalid genome accession: {0}")]
    InvalidAccession(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("failed to decode NCBI response: {0}")]
    NcbiDecode(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("mlst failed: {0}")]
    TypingFailed(String),

    #[error("malformed mlst output: {0}")]
    TypingOutput(String),

    #[error("scheme not found in mlst catalog: {0}")]
    SchemeNotFound(String),

    #[error("cache table not found: {0}")]
    TableNotFound(String),

    #[error("cache table {0} is locked by another writer")]
    #[diagnostic(help("remove the stale .lock file if no other mlst-seeker process is running"))]
    CacheLocked(String),

    #[error("output directory {0} is not empty")]
    #[diagnostic(help("pick an empty or new --output-dir; it is cleared before extraction"))]
    OutputDirNotEmpty(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
