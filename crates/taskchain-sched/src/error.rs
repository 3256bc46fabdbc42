//! Error types for scheduler construction.

/// Errors raised while bringing up a scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The dedicated primary context thread could not be spawned.
    #[error("failed to spawn primary context thread: {0}")]
    PrimarySpawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_error_display() {
        let err = SchedulerError::PrimarySpawn(std::io::Error::other("no threads left"));
        assert!(err.to_string().contains("primary context thread"));
    }
}
