use crate::types::Factor;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures surfaced by a simulation run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// One or more required factors are missing or malformed. Carries every
    /// offending factor, not just the first.
    #[error("cannot run simulation, missing or invalid factors: {}", factor_list(.missing))]
    InvalidInput { missing: Vec<Factor> },

    /// The caller asked the run to stop. Partial samples are discarded.
    #[error("simulation cancelled after {done} of {total} draws")]
    Cancelled { done: u32, total: u32 },
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled { .. })
    }

    /// Missing factor labels, empty for non-validation errors.
    pub fn missing_factors(&self) -> Vec<String> {
        match self {
            EngineError::InvalidInput { missing } => {
                missing.iter().map(|f| f.to_string()).collect()
            }
            EngineError::Cancelled { .. } => Vec::new(),
        }
    }
}

fn factor_list(missing: &[Factor]) -> String {
    missing.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message_lists_every_factor() {
        let err = EngineError::InvalidInput { missing: vec![Factor::Lef, Factor::PrimaryLoss] };
        assert_eq!(
            err.to_string(),
            "cannot run simulation, missing or invalid factors: LEF, Primary Loss"
        );
        assert_eq!(err.missing_factors(), vec!["LEF", "Primary Loss"]);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancellation_is_distinguishable() {
        let err = EngineError::Cancelled { done: 2_000, total: 10_000 };
        assert!(err.is_cancelled());
        assert!(err.missing_factors().is_empty());
        assert_eq!(err.to_string(), "simulation cancelled after 2000 of 10000 draws");
    }
}
