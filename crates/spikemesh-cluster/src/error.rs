//! Error types for the cluster coordinator

use thiserror::Error;

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur in the cluster coordinator
#[derive(Error, Debug)]
pub enum ClusterError {
    /// An engine is already registered under the same key
    #[error("Engine ({backplane}, {node}) already registered")]
    EngineExists {
        /// Backplane id of the duplicate key
        backplane: u8,
        /// Node id of the duplicate key
        node: u8,
    },

    /// Engine layer error
    #[error("Engine error: {source}")]
    Engine {
        #[from]
        /// Source engine error
        source: spikemesh_engine::EngineError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClusterError::EngineExists {
            backplane: 1,
            node: 4,
        };
        assert!(format!("{}", err).contains("(1, 4)"));
    }
}
