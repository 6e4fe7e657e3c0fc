//! Fatal error kinds for the pipeline: only input-not-found,
//! load-failed, payload-extraction-failed and write-failed are promoted to a hard
//! error. Everything else (no decoder found, a skipped accessor, a malformed table
//! record, residual calls after rewrite) is counted on [`deobfstr_config::Report`]
//! and never returned as an `Err`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("failed to load module from {path}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: dotscope::Error,
    },

    #[error("decoder type `{type_name}` found but its payload bytes were unreachable")]
    PayloadExtractionFailed { type_name: String },

    #[error("failed to write module to {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: dotscope::Error,
    },
}
