// src/error.rs

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every way a run can fail. All variants are fatal: the run aborts and
/// nothing is committed to the sink.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The locator could not be fetched, or its body is not a well-formed table.
    #[error("retrieving `{label}` from {locator}")]
    Retrieval {
        label: String,
        locator: String,
        #[source]
        source: BoxError,
    },

    /// A raw table lacks one of the identifying columns, or has it out of place.
    #[error("`{label}` table is missing identifying column `{column}` in its leading positions")]
    SchemaMismatch { label: String, column: String },

    #[error("merge called with no tables")]
    EmptyInput,

    /// Two tables share a label, or a label shadows one of the key columns.
    #[error("label `{0}` collides with another column")]
    LabelCollision(String),

    #[error("writing table `{table}` to the sink")]
    Sink {
        table: String,
        #[source]
        source: BoxError,
    },
}

impl PipelineError {
    pub(crate) fn retrieval(
        label: &str,
        locator: impl ToString,
        source: impl Into<BoxError>,
    ) -> Self {
        PipelineError::Retrieval {
            label: label.to_string(),
            locator: locator.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn sink(table: &str, source: impl Into<BoxError>) -> Self {
        PipelineError::Sink {
            table: table.to_string(),
            source: source.into(),
        }
    }
}
