use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::template::TemplateError;

#[derive(Debug, Error, Diagnostic)]
pub enum RetrieveError {
    #[error("invalid cycle: {0} (expected ISO 8601, e.g. 2025-05-04T00)")]
    InvalidCycle(String),

    #[error("invalid lead time: {0} (specify hours[:minutes[:seconds]])")]
    InvalidLeadTime(String),

    #[error("invalid range specification: {0}")]
    InvalidRange(String),

    #[error("unsupported data store: {0}")]
    UnsupportedStore(String),

    #[error("at least one data store must be requested")]
    NoDataStores,

    #[error("an input file path is required when disk is a requested data store")]
    MissingInputPath,

    #[error("missing data locations config at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse data locations config: {0}")]
    ConfigParse(String),

    #[error("invalid data locations config: {0}")]
    InvalidConfig(String),

    #[error("data type {0} is not defined in the data locations config")]
    UnknownDataType(String),

    #[error("data store {store} is not configured for data type {data_type}")]
    StoreNotConfigured { data_type: String, store: String },

    #[error("no file name convention for {data_type} ({context})")]
    MissingFileNames { data_type: String, context: String },

    #[error(
        "location group has {locations} entries but {templates} file templates; \
         grouped locations are paired with templates one to one"
    )]
    LocationTemplateMismatch { locations: usize, templates: usize },

    #[error(transparent)]
    #[diagnostic(help("check the placeholders in the data locations config or --file-templates"))]
    Template(#[from] TemplateError),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("archive extraction failed: {0}")]
    Archive(String),

    #[error("failed to write summary file {path}: {message}")]
    Summary { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
