//! Population rules per scoring type
//!
//! A group's populations are bound once, when the measure is built, into a
//! [`ScoringPopulations`] variant holding the index of every population the
//! scoring algorithm reads. Missing, forbidden and duplicated populations
//! are rejected here so evaluation never has to re-check them.

use octofhir_cqm_types::{MeasurePopulationType, MeasureScoring};

use super::population::PopulationDef;
use crate::error::{MeasureError, MeasureResult};

use MeasurePopulationType as P;

/// Populations read by the proportion and ratio algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProportionPopulations {
    pub initial: usize,
    pub numerator: usize,
    pub denominator: usize,
    pub numerator_exclusion: Option<usize>,
    pub denominator_exclusion: Option<usize>,
    pub denominator_exception: Option<usize>,
    pub total_numerator: usize,
    pub total_denominator: usize,
    /// Ratio groups scored on observations rather than counts
    pub observations: Option<RatioObservations>,
}

/// The two measure-observations of a ratio continuous-variable group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatioObservations {
    pub numerator: usize,
    pub denominator: usize,
}

/// Populations read by the continuous-variable algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousVariablePopulations {
    pub initial: usize,
    pub measure_population: usize,
    pub exclusion: Option<usize>,
    pub observation: Option<usize>,
}

/// Scoring type of a group, bound to the populations it uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPopulations {
    Proportion(ProportionPopulations),
    Ratio(ProportionPopulations),
    ContinuousVariable(ContinuousVariablePopulations),
    Cohort { initial: usize },
}

/// Whether `scoring` admits a population of type `population_type`
pub fn is_allowed(scoring: MeasureScoring, population_type: MeasurePopulationType) -> bool {
    if population_type.is_total() || population_type == P::InitialPopulation {
        return true;
    }
    match scoring {
        MeasureScoring::Proportion => matches!(
            population_type,
            P::Denominator
                | P::DenominatorExclusion
                | P::DenominatorException
                | P::NumeratorExclusion
                | P::Numerator
        ),
        MeasureScoring::Ratio => matches!(
            population_type,
            P::Denominator
                | P::DenominatorExclusion
                | P::NumeratorExclusion
                | P::Numerator
                | P::MeasureObservation
        ),
        MeasureScoring::ContinuousVariable => matches!(
            population_type,
            P::MeasurePopulation | P::MeasurePopulationExclusion | P::MeasureObservation
        ),
        MeasureScoring::Cohort => false,
    }
}

struct Binder<'a> {
    scoring: MeasureScoring,
    group_id: &'a str,
    populations: &'a [PopulationDef],
}

impl Binder<'_> {
    fn optional(&self, population_type: MeasurePopulationType) -> MeasureResult<Option<usize>> {
        let mut found = self
            .populations
            .iter()
            .enumerate()
            .filter(|(_, population)| population.population_type() == population_type)
            .map(|(index, _)| index);
        let first = found.next();
        if found.next().is_some() {
            return Err(MeasureError::invalid_request(format!(
                "Group '{}' has more than one {} population",
                self.group_id, population_type
            )));
        }
        Ok(first)
    }

    fn required(&self, population_type: MeasurePopulationType) -> MeasureResult<usize> {
        self.optional(population_type)?.ok_or_else(|| {
            MeasureError::missing_population(self.scoring, population_type, self.group_id)
        })
    }

    fn observations(&self) -> Vec<usize> {
        self.populations
            .iter()
            .enumerate()
            .filter(|(_, population)| population.is_observation())
            .map(|(index, _)| index)
            .collect()
    }

    fn observation_reference(&self, index: usize) -> MeasureResult<&str> {
        let population = &self.populations[index];
        population.criteria_reference().ok_or_else(|| {
            MeasureError::invalid_request(format!(
                "Measure observation '{}' of group '{}' has no criteria reference",
                population.id(),
                self.group_id
            ))
        })
    }

    fn proportion(&self) -> MeasureResult<ProportionPopulations> {
        Ok(ProportionPopulations {
            initial: self.required(P::InitialPopulation)?,
            numerator: self.required(P::Numerator)?,
            denominator: self.required(P::Denominator)?,
            numerator_exclusion: self.optional(P::NumeratorExclusion)?,
            denominator_exclusion: self.optional(P::DenominatorExclusion)?,
            denominator_exception: self.optional(P::DenominatorException)?,
            total_numerator: self.required(P::TotalNumerator)?,
            total_denominator: self.required(P::TotalDenominator)?,
            observations: None,
        })
    }

    fn ratio_observations(
        &self,
        bound: &ProportionPopulations,
    ) -> MeasureResult<Option<RatioObservations>> {
        let observations = self.observations();
        match observations.as_slice() {
            [] => Ok(None),
            [first, second] => {
                let numerator_id = self.populations[bound.numerator].id();
                let denominator_id = self.populations[bound.denominator].id();
                let mut numerator = None;
                let mut denominator = None;
                for &index in &[*first, *second] {
                    let reference = self.observation_reference(index)?;
                    if reference == numerator_id && numerator.is_none() {
                        numerator = Some(index);
                    } else if reference == denominator_id && denominator.is_none() {
                        denominator = Some(index);
                    }
                }
                match (numerator, denominator) {
                    (Some(numerator), Some(denominator)) => Ok(Some(RatioObservations {
                        numerator,
                        denominator,
                    })),
                    _ => Err(MeasureError::invalid_request(format!(
                        "Ratio group '{}' measure observations must reference the numerator '{}' and the denominator '{}'",
                        self.group_id, numerator_id, denominator_id
                    ))),
                }
            }
            other => Err(MeasureError::invalid_request(format!(
                "Ratio group '{}' must have exactly 2 measure observations, found {}",
                self.group_id,
                other.len()
            ))),
        }
    }

    fn continuous_variable(&self) -> MeasureResult<ContinuousVariablePopulations> {
        let initial = self.required(P::InitialPopulation)?;
        let measure_population = self.required(P::MeasurePopulation)?;
        let exclusion = self.optional(P::MeasurePopulationExclusion)?;
        let observation = self.optional(P::MeasureObservation)?;
        if let Some(index) = observation {
            if let Some(reference) = self.populations[index].criteria_reference() {
                let expected = self.populations[measure_population].id();
                if reference != expected {
                    return Err(MeasureError::invalid_request(format!(
                        "Measure observation '{}' of group '{}' must reference the measure population '{}', not '{}'",
                        self.populations[index].id(),
                        self.group_id,
                        expected,
                        reference
                    )));
                }
            }
        }
        Ok(ContinuousVariablePopulations {
            initial,
            measure_population,
            exclusion,
            observation,
        })
    }
}

impl ScoringPopulations {
    /// Validate `populations` against `scoring` and bind their indices
    pub fn bind(
        scoring: MeasureScoring,
        group_id: &str,
        populations: &[PopulationDef],
    ) -> MeasureResult<Self> {
        if let Some(forbidden) = populations
            .iter()
            .find(|population| !is_allowed(scoring, population.population_type()))
        {
            return Err(MeasureError::forbidden_population(
                scoring,
                forbidden.population_type(),
                group_id,
            ));
        }

        let binder = Binder {
            scoring,
            group_id,
            populations,
        };

        match scoring {
            MeasureScoring::Proportion => Ok(Self::Proportion(binder.proportion()?)),
            MeasureScoring::Ratio => {
                let mut bound = binder.proportion()?;
                bound.observations = binder.ratio_observations(&bound)?;
                Ok(Self::Ratio(bound))
            }
            MeasureScoring::ContinuousVariable => {
                Ok(Self::ContinuousVariable(binder.continuous_variable()?))
            }
            MeasureScoring::Cohort => Ok(Self::Cohort {
                initial: binder.required(P::InitialPopulation)?,
            }),
        }
    }

    pub fn scoring(&self) -> MeasureScoring {
        match self {
            Self::Proportion(_) => MeasureScoring::Proportion,
            Self::Ratio(_) => MeasureScoring::Ratio,
            Self::ContinuousVariable(_) => MeasureScoring::ContinuousVariable,
            Self::Cohort { .. } => MeasureScoring::Cohort,
        }
    }

    pub fn initial(&self) -> usize {
        match self {
            Self::Proportion(bound) | Self::Ratio(bound) => bound.initial,
            Self::ContinuousVariable(bound) => bound.initial,
            Self::Cohort { initial } => *initial,
        }
    }
}
