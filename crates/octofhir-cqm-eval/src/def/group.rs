//! Measure groups

use octofhir_cqm_types::{
    ConceptDef, ImprovementNotation, MeasurePopulationType, MeasureScoring, PopulationBasis,
};

use super::population::PopulationDef;
use super::scoring::ScoringPopulations;
use super::stratifier::StratifierDef;
use crate::error::{MeasureError, MeasureResult};

/// One group of a measure: its populations, stratifiers and score
#[derive(Debug, Clone)]
pub struct GroupDef {
    id: String,
    code: Option<ConceptDef>,
    basis: PopulationBasis,
    scoring: Option<MeasureScoring>,
    improvement_notation: ImprovementNotation,
    populations: Vec<PopulationDef>,
    stratifiers: Vec<StratifierDef>,
    bound: Option<ScoringPopulations>,
    score: Option<f64>,
}

impl GroupDef {
    /// Build a group; total-numerator and total-denominator populations are
    /// appended when absent.
    pub fn new(
        id: impl Into<String>,
        basis: PopulationBasis,
        mut populations: Vec<PopulationDef>,
    ) -> Self {
        for total in [
            MeasurePopulationType::TotalNumerator,
            MeasurePopulationType::TotalDenominator,
        ] {
            if !populations.iter().any(|p| p.population_type() == total) {
                populations.push(PopulationDef::total(total));
            }
        }
        let boolean_basis = basis.is_boolean();
        for population in &mut populations {
            population.set_boolean_basis(boolean_basis);
        }

        Self {
            id: id.into(),
            code: None,
            basis,
            scoring: None,
            improvement_notation: ImprovementNotation::default(),
            populations,
            stratifiers: Vec::new(),
            bound: None,
            score: None,
        }
    }

    pub fn with_code(mut self, code: ConceptDef) -> Self {
        self.code = Some(code);
        self
    }

    /// Group-level scoring, used when the measure declares none
    pub fn with_scoring(mut self, scoring: MeasureScoring) -> Self {
        self.scoring = Some(scoring);
        self
    }

    pub fn with_improvement_notation(mut self, notation: ImprovementNotation) -> Self {
        self.improvement_notation = notation;
        self
    }

    pub fn with_stratifier(mut self, stratifier: StratifierDef) -> Self {
        self.stratifiers.push(stratifier);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> Option<&ConceptDef> {
        self.code.as_ref()
    }

    pub fn basis(&self) -> &PopulationBasis {
        &self.basis
    }

    pub fn is_boolean_basis(&self) -> bool {
        self.basis.is_boolean()
    }

    pub fn improvement_notation(&self) -> ImprovementNotation {
        self.improvement_notation
    }

    /// Effective scoring: the measure's when it has one, else the group's own
    pub fn scoring_for(&self, measure_scoring: Option<MeasureScoring>) -> Option<MeasureScoring> {
        measure_scoring.or(self.scoring)
    }

    pub(crate) fn bind(&mut self, measure_scoring: Option<MeasureScoring>, measure_url: &str) -> MeasureResult<()> {
        let scoring = self
            .scoring_for(measure_scoring)
            .ok_or_else(|| MeasureError::missing_scoring(measure_url))?;
        let bound = ScoringPopulations::bind(scoring, &self.id, &self.populations)?;
        let boolean_basis = self.is_boolean_basis();
        for stratifier in &self.stratifiers {
            stratifier.validate(&self.id, boolean_basis)?;
        }
        self.bound = Some(bound);
        Ok(())
    }

    /// Populations bound to the group's scoring type
    pub fn scoring_populations(&self) -> MeasureResult<ScoringPopulations> {
        self.bound.ok_or_else(|| {
            MeasureError::internal(format!("Group '{}' has no resolved scoring", self.id))
        })
    }

    /// Resolved scoring type, once the owning measure has been built
    pub fn scoring(&self) -> Option<MeasureScoring> {
        self.bound.as_ref().map(ScoringPopulations::scoring)
    }

    pub fn populations(&self) -> &[PopulationDef] {
        &self.populations
    }

    /// First population of the given type
    pub fn population(&self, population_type: MeasurePopulationType) -> Option<&PopulationDef> {
        self.populations_of(population_type).next()
    }

    pub fn populations_of(
        &self,
        population_type: MeasurePopulationType,
    ) -> impl Iterator<Item = &PopulationDef> {
        self.populations
            .iter()
            .filter(move |population| population.population_type() == population_type)
    }

    pub fn population_by_id(&self, id: &str) -> Option<&PopulationDef> {
        self.populations.iter().find(|population| population.id() == id)
    }

    pub fn population_at(&self, index: usize) -> &PopulationDef {
        &self.populations[index]
    }

    pub(crate) fn population_at_mut(&mut self, index: usize) -> &mut PopulationDef {
        &mut self.populations[index]
    }

    /// Mutable access to population `target` alongside shared access to
    /// population `source`
    pub(crate) fn populations_pair_mut(
        &mut self,
        target: usize,
        source: usize,
    ) -> (&mut PopulationDef, &PopulationDef) {
        assert_ne!(target, source, "population pair must be distinct");
        if target < source {
            let (head, tail) = self.populations.split_at_mut(source);
            (&mut head[target], &tail[0])
        } else {
            let (head, tail) = self.populations.split_at_mut(target);
            (&mut tail[0], &head[source])
        }
    }

    pub fn stratifiers(&self) -> &[StratifierDef] {
        &self.stratifiers
    }

    pub fn stratifiers_mut(&mut self) -> &mut [StratifierDef] {
        &mut self.stratifiers
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn set_score(&mut self, score: Option<f64>) {
        self.score = score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MeasurePopulationType as P;

    fn proportion_group() -> GroupDef {
        GroupDef::new(
            "g1",
            PopulationBasis::Boolean,
            vec![
                PopulationDef::new("ip", P::InitialPopulation, "Initial Population"),
                PopulationDef::new("den", P::Denominator, "Denominator"),
                PopulationDef::new("num", P::Numerator, "Numerator"),
            ],
        )
    }

    #[test]
    fn test_totals_added() {
        let group = proportion_group();
        assert_eq!(group.populations().len(), 5);
        assert!(group.population(P::TotalNumerator).is_some());
        assert!(group.population(P::TotalDenominator).unwrap().expression().is_none());
    }

    #[test]
    fn test_measure_scoring_takes_precedence() {
        let group = proportion_group().with_scoring(MeasureScoring::Ratio);
        assert_eq!(
            group.scoring_for(Some(MeasureScoring::Proportion)),
            Some(MeasureScoring::Proportion)
        );
        assert_eq!(group.scoring_for(None), Some(MeasureScoring::Ratio));
    }

    #[test]
    fn test_bind_without_scoring_fails() {
        let mut group = proportion_group();
        let err = group.bind(None, "http://example.org/Measure/m").unwrap_err();
        assert!(matches!(err, MeasureError::MissingScoring { .. }));
        assert!(group.scoring_populations().is_err());
    }

    #[test]
    fn test_population_pair() {
        let mut group = proportion_group();
        let (numerator, denominator) = group.populations_pair_mut(2, 1);
        assert_eq!(numerator.id(), "num");
        assert_eq!(denominator.id(), "den");
        let (denominator, numerator) = group.populations_pair_mut(1, 2);
        assert_eq!(denominator.id(), "den");
        assert_eq!(numerator.id(), "num");
    }

    #[test]
    fn test_basis_propagates() {
        let group = GroupDef::new(
            "g1",
            PopulationBasis::Resource("Encounter".to_string()),
            vec![PopulationDef::new("ip", P::InitialPopulation, "Initial Population")],
        );
        assert!(group.populations().iter().all(|p| !p.is_boolean_basis()));
    }
}
