use thiserror::Error;

/// Loud failures surfaced by [`Registry::instance`](crate::Registry::instance) in
/// development builds.
///
/// Release builds without the `dev-checks` feature never construct these; the same
/// conditions degrade to `Ok(None)` there.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SingletonError {
    #[error("no active {type_name} is placed and its policy does not allow auto-create")]
    MissingRequiredPlacement { type_name: &'static str },

    #[error("an inactive or disabled {type_name} exists; activate it instead of auto-creating")]
    DormantInstanceBlocksCreate { type_name: &'static str },
}

impl SingletonError {
    pub fn type_name(&self) -> &'static str {
        match self {
            SingletonError::MissingRequiredPlacement { type_name }
            | SingletonError::DormantInstanceBlocksCreate { type_name } => type_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_placement_display() {
        let err = SingletonError::MissingRequiredPlacement { type_name: "Level" };
        assert_eq!(
            err.to_string(),
            "no active Level is placed and its policy does not allow auto-create"
        );
    }

    #[test]
    fn test_dormant_display() {
        let err = SingletonError::DormantInstanceBlocksCreate { type_name: "Audio" };
        assert_eq!(
            err.to_string(),
            "an inactive or disabled Audio exists; activate it instead of auto-creating"
        );
    }

    #[test]
    fn test_type_name() {
        let err = SingletonError::MissingRequiredPlacement { type_name: "Level" };
        assert_eq!(err.type_name(), "Level");
    }

    #[test]
    fn test_error_trait() {
        let err: &dyn std::error::Error =
            &SingletonError::MissingRequiredPlacement { type_name: "Level" };
        assert!(err.to_string().contains("Level"));
    }
}
