//! Error kinds surfaced by the core pipeline.
//!
//! Degenerate computations (no frames processed, no compliance-checked
//! records, unknown fps) are not errors and never reach this type.

/// Failure of a core operation. A failed call never yields a partial report.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or missing detection data, unreadable frame source,
    /// out-of-range parameters.
    #[error("invalid input: {0}")]
    Input(String),

    /// The inference or storage collaborator failed.
    #[error("{stage} failed: {source}")]
    Collaborator {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The job was cancelled before the frame budget or stream end.
    #[error("processing cancelled before frame {frame_number}")]
    Cancelled { frame_number: u64 },
}

impl PipelineError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn collaborator(stage: &'static str, source: anyhow::Error) -> Self {
        Self::Collaborator { stage, source }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_a_single_cause() {
        let err = PipelineError::collaborator("inference", anyhow::anyhow!("model offline"));
        assert_eq!(err.to_string(), "inference failed: model offline");

        let err = PipelineError::input("sample_rate must be at least 1");
        assert_eq!(err.to_string(), "invalid input: sample_rate must be at least 1");
        assert!(err.is_input());
    }
}
