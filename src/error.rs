//! Failure taxonomy for the report pipeline.
//!
//! Any of these aborts the whole report run; there is no degraded mode. The
//! variants exist so the failing stage is named when the run dies.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source table is missing columns the pipeline relies on.
    #[error("{table}: missing required column(s) {columns:?}")]
    Schema {
        table: &'static str,
        columns: Vec<String>,
    },

    /// A join wiped out every row, which means the two tables don't describe
    /// the same universe (wrong year, wrong region, wrong key encoding).
    #[error("{stage}: join produced no rows ({detail})")]
    JoinIntegrity {
        stage: &'static str,
        detail: String,
    },

    /// A remote source could not be downloaded.
    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A statistical fit failed, e.g. a singular design matrix.
    #[error("computation failed: {0}")]
    Computation(String),
}
