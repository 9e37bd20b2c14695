//! Evaluation options

use octofhir_cqm_types::{MeasureEvalType, MeasureReportType};
use serde::{Deserialize, Serialize};

/// Options controlling one evaluation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeasureEvaluationOptions {
    /// Apply the inclusion/exclusion algebra between populations. When
    /// false, populations hold exactly what their expressions returned.
    pub apply_scoring_set_membership: bool,
    /// Carried through for report renderers via
    /// [`report_type`](Self::report_type); evaluation itself ignores it.
    pub evaluation_type: MeasureEvalType,
    /// Engine workers used for expression evaluation
    pub parallelism: usize,
    pub validate_population_basis: bool,
}

impl Default for MeasureEvaluationOptions {
    fn default() -> Self {
        Self {
            apply_scoring_set_membership: true,
            evaluation_type: MeasureEvalType::default(),
            parallelism: 1,
            validate_population_basis: true,
        }
    }
}

impl MeasureEvaluationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_scoring_set_membership(mut self, apply: bool) -> Self {
        self.apply_scoring_set_membership = apply;
        self
    }

    pub fn with_evaluation_type(mut self, evaluation_type: MeasureEvalType) -> Self {
        self.evaluation_type = evaluation_type;
        self
    }

    /// Zero is treated as one
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_validate_population_basis(mut self, validate: bool) -> Self {
        self.validate_population_basis = validate;
        self
    }

    pub fn report_type(&self) -> MeasureReportType {
        self.evaluation_type.report_type()
    }
}
