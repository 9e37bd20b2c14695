//! Errors raised while evaluating, stratifying and scoring measures

use octofhir_cqm_types::{InvalidSubjectId, MeasurePopulationType, MeasureScoring};
use thiserror::Error;

/// Result type for measure evaluation
pub type MeasureResult<T> = Result<T, MeasureError>;

/// Errors of the measure engine
#[derive(Debug, Error, Clone)]
pub enum MeasureError {
    /// Malformed request or measure content
    #[error("{message}")]
    InvalidRequest { message: String },

    /// An expression produced a value the engine cannot use for one subject
    #[error("Invalid result for expression '{expression}': {message}")]
    InvalidResult { expression: String, message: String },

    /// A population required by the scoring type is absent
    #[error("{scoring} group '{group_id}' requires a {population_type} population")]
    MissingPopulation {
        scoring: MeasureScoring,
        population_type: MeasurePopulationType,
        group_id: String,
    },

    /// A population the scoring type does not allow is present
    #[error("{scoring} group '{group_id}' does not allow a {population_type} population")]
    ForbiddenPopulation {
        scoring: MeasureScoring,
        population_type: MeasurePopulationType,
        group_id: String,
    },

    /// Observations are present but no aggregation method was declared
    #[error("Aggregate method must be provided for continuous variable scoring, but is NO-OP.")]
    MissingAggregateMethod,

    /// Neither the measure nor the group declares a scoring type
    #[error("Must have scoring either at the measure or group level for measure URL: {measure_url}")]
    MissingScoring { measure_url: String },

    /// One or more libraries could not be resolved
    #[error("Unable to resolve libraries [{}]: {message}", .identifiers.join(", "))]
    LibraryResolution {
        identifiers: Vec<String>,
        message: String,
    },

    /// Failure reported by the expression engine
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Internal error (should not happen)
    #[error("Internal measure evaluation error: {message}")]
    Internal { message: String },
}

impl MeasureError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn invalid_result(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResult {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn missing_population(
        scoring: MeasureScoring,
        population_type: MeasurePopulationType,
        group_id: impl Into<String>,
    ) -> Self {
        Self::MissingPopulation {
            scoring,
            population_type,
            group_id: group_id.into(),
        }
    }

    pub fn forbidden_population(
        scoring: MeasureScoring,
        population_type: MeasurePopulationType,
        group_id: impl Into<String>,
    ) -> Self {
        Self::ForbiddenPopulation {
            scoring,
            population_type,
            group_id: group_id.into(),
        }
    }

    pub fn missing_scoring(measure_url: impl Into<String>) -> Self {
        Self::MissingScoring {
            measure_url: measure_url.into(),
        }
    }

    pub fn library_resolution(identifiers: Vec<String>, message: impl Into<String>) -> Self {
        Self::LibraryResolution {
            identifiers,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Engine failure; function/expression kind confusion becomes a request error
    pub fn from_engine(err: EngineError) -> Self {
        if err.is_kind_mismatch() {
            Self::invalid_request(err.to_string())
        } else {
            Self::Engine(err)
        }
    }

    /// Configuration errors abort the measure; the rest are recorded
    /// against the subject that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidResult { .. } | Self::Engine(_))
    }
}

impl From<InvalidSubjectId> for MeasureError {
    fn from(err: InvalidSubjectId) -> Self {
        Self::invalid_request(err.to_string())
    }
}

/// Errors reported by the expression engine collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Library not found: {library}")]
    UndefinedLibrary { library: String },

    #[error("Could not resolve expression '{name}' in library {library}")]
    UndefinedExpression { library: String, name: String },

    /// A plain expression was invoked as a function
    #[error("Library {library} does not have function {name}")]
    NotAFunction { library: String, name: String },

    /// A function was evaluated as a plain expression
    #[error("Expression '{name}' in library {library} is a function and requires invocation")]
    FunctionNotInvoked { library: String, name: String },

    #[error("Error evaluating '{name}': {message}")]
    Evaluation { name: String, message: String },
}

impl EngineError {
    pub fn undefined_library(library: impl Into<String>) -> Self {
        Self::UndefinedLibrary {
            library: library.into(),
        }
    }

    pub fn undefined_expression(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UndefinedExpression {
            library: library.into(),
            name: name.into(),
        }
    }

    pub fn not_a_function(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotAFunction {
            library: library.into(),
            name: name.into(),
        }
    }

    pub fn function_not_invoked(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self::FunctionNotInvoked {
            library: library.into(),
            name: name.into(),
        }
    }

    pub fn evaluation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Function/expression kind confusion, surfaced as a request error
    pub fn is_kind_mismatch(&self) -> bool {
        matches!(
            self,
            Self::NotAFunction { .. } | Self::FunctionNotInvoked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MeasureError::MissingAggregateMethod.is_fatal());
        assert!(MeasureError::invalid_request("bad").is_fatal());
        assert!(!MeasureError::invalid_result("Obs", "not a number").is_fatal());
        assert!(!MeasureError::from(EngineError::evaluation("IP", "boom")).is_fatal());
    }

    #[test]
    fn test_kind_mismatch_is_request_error() {
        let err = MeasureError::from_engine(EngineError::not_a_function("Lib", "Denominator"));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Library Lib does not have function Denominator");

        let err = MeasureError::from_engine(EngineError::evaluation("Numerator", "boom"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = MeasureError::library_resolution(
            vec!["Lib|1.0".to_string(), "Other|2.0".to_string()],
            "missing content",
        );
        assert_eq!(
            err.to_string(),
            "Unable to resolve libraries [Lib|1.0, Other|2.0]: missing content"
        );

        let err = MeasureError::missing_population(
            MeasureScoring::Proportion,
            MeasurePopulationType::Denominator,
            "group-1",
        );
        assert_eq!(
            err.to_string(),
            "proportion group 'group-1' requires a denominator population"
        );
    }

    #[test]
    fn test_subject_id_error_is_request_error() {
        let err: MeasureError = octofhir_cqm_types::SubjectRef::parse("123").unwrap_err().into();
        assert!(matches!(err, MeasureError::InvalidRequest { .. }));
        assert!(err.is_fatal());
    }
}
