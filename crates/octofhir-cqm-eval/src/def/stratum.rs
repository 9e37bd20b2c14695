//! Strata produced by the stratification pass

use octofhir_cqm_types::{ConceptDef, ExpressionValue, MeasurePopulationType, QuantityDef};
use smallvec::SmallVec;

use crate::collections::MemberSet;

/// A value distinguishing a stratum, tagged with the component it came from
#[derive(Debug, Clone)]
pub struct StratumValueDef {
    pub component_id: Option<String>,
    pub code: Option<ConceptDef>,
    pub value: ExpressionValue,
}

/// Slice of one group population that falls into a stratum
#[derive(Debug, Clone)]
pub struct StratumPopulationDef {
    pub population_id: String,
    pub population_type: MeasurePopulationType,
    /// Qualified ids of the subjects contributing to the slice
    pub subjects: Vec<String>,
    /// Resources in the slice (resource basis only)
    pub resources: MemberSet,
    /// Observations in the slice (measure-observation populations only)
    pub observations: Vec<QuantityDef>,
    pub count: usize,
}

impl StratumPopulationDef {
    pub fn observation_values(&self) -> Vec<f64> {
        self.observations.iter().map(QuantityDef::value).collect()
    }
}

#[derive(Debug, Clone)]
pub struct StratumDef {
    text: String,
    values: SmallVec<[StratumValueDef; 2]>,
    populations: Vec<StratumPopulationDef>,
    score: Option<f64>,
}

impl StratumDef {
    pub fn new(
        text: impl Into<String>,
        values: SmallVec<[StratumValueDef; 2]>,
        populations: Vec<StratumPopulationDef>,
    ) -> Self {
        Self {
            text: text.into(),
            values,
            populations,
            score: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn values(&self) -> &[StratumValueDef] {
        &self.values
    }

    pub fn populations(&self) -> &[StratumPopulationDef] {
        &self.populations
    }

    /// First population slice of the given type
    pub fn population(&self, population_type: MeasurePopulationType) -> Option<&StratumPopulationDef> {
        self.populations
            .iter()
            .find(|population| population.population_type == population_type)
    }

    pub fn population_by_id(&self, id: &str) -> Option<&StratumPopulationDef> {
        self.populations
            .iter()
            .find(|population| population.population_id == id)
    }

    /// Count of the first slice of `population_type`, zero when absent
    pub fn count(&self, population_type: MeasurePopulationType) -> usize {
        self.population(population_type)
            .map_or(0, |population| population.count)
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn set_score(&mut self, score: Option<f64>) {
        self.score = score;
    }
}
