use std::fmt;

#[derive(Debug)]
pub enum TallyError {
    Io(std::io::Error),
    SourceUnavailable {
        name: String,
        reason: std::io::Error,
    },
    Partition {
        index: usize,
        reason: std::io::Error,
    },
    InvalidPlan(String),
    Config(String),
    Poisoned(String),
    Worker(String),
    Other(String),
}

impl fmt::Display for TallyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TallyError::Io(e) => write!(f, "IO error: {}", e),
            TallyError::SourceUnavailable { name, reason } => {
                write!(f, "Cannot open source {}: {}", name, reason)
            }
            TallyError::Partition { index, reason } => {
                write!(f, "Partition {} failed: {}", index, reason)
            }
            TallyError::InvalidPlan(e) => write!(f, "Invalid partition plan: {}", e),
            TallyError::Config(e) => write!(f, "Config error: {}", e),
            TallyError::Poisoned(e) => write!(f, "Lock poisoned: {}", e),
            TallyError::Worker(e) => write!(f, "Worker error: {}", e),
            TallyError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for TallyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TallyError::Io(e) => Some(e),
            TallyError::SourceUnavailable { reason, .. } => Some(reason),
            TallyError::Partition { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        TallyError::Io(err)
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Other(format!("JSON encoding failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for TallyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        TallyError::Poisoned(err.to_string())
    }
}

impl From<&str> for TallyError {
    fn from(err: &str) -> Self {
        TallyError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_partition_error_display_names_index() {
        let err = TallyError::Partition {
            index: 3,
            reason: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "Partition 3 failed: gone");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_from_str_is_other() {
        let err: TallyError = "boom".into();
        assert!(matches!(err, TallyError::Other(ref s) if s == "boom"));
        assert!(err.source().is_none());
    }
}
