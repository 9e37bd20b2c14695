//! Scoring of a fully evaluated and stratified measure

use octofhir_cqm_types::{
    AggregateMethod, ImprovementNotation, MeasurePopulationType as P, QuantityDef,
};

use crate::def::{
    ContinuousVariablePopulations, GroupDef, MeasureDef, PopulationDef, ProportionPopulations,
    ScoringPopulations, StratumDef,
};
use crate::error::MeasureResult;
use crate::score::{aggregate, apply_improvement_notation, proportion_score, ratio_score};

pub struct MeasureDefScorer;

impl MeasureDefScorer {
    /// Score every group and stratum of `measure`
    pub fn score(measure: &mut MeasureDef) -> MeasureResult<()> {
        for group in measure.groups_mut() {
            Self::score_group(group)?;
        }
        Ok(())
    }

    pub fn score_group(group: &mut GroupDef) -> MeasureResult<()> {
        let bound = group.scoring_populations()?;
        let notation = group.improvement_notation();

        let score = match bound {
            ScoringPopulations::Proportion(p) | ScoringPopulations::Ratio(p) => match p.observations {
                None => group_proportion(group, &p),
                Some(ratio) => {
                    let numerator = aggregate_population(group.population_at_mut(ratio.numerator))?;
                    let denominator =
                        aggregate_population(group.population_at_mut(ratio.denominator))?;
                    ratio_score(numerator, denominator)
                }
            },
            ScoringPopulations::ContinuousVariable(ContinuousVariablePopulations {
                observation: Some(observation),
                ..
            }) => aggregate_population(group.population_at_mut(observation))?,
            ScoringPopulations::ContinuousVariable(_) | ScoringPopulations::Cohort { .. } => None,
        };
        let score = improve(score, bound, notation);
        log::debug!("Group '{}' scored {:?}", group.id(), score);
        group.set_score(score);

        let methods = ObservationMethods::of(group, bound);
        for stratifier in group.stratifiers_mut() {
            for stratum in stratifier.strata_mut() {
                let score = score_stratum(stratum, bound, &methods)?;
                stratum.set_score(improve(score, bound, notation));
            }
        }
        Ok(())
    }
}

/// Improvement notation applies to proportion scores and to ratios of
/// observation aggregates
fn improve(
    score: Option<f64>,
    bound: ScoringPopulations,
    notation: ImprovementNotation,
) -> Option<f64> {
    match bound {
        ScoringPopulations::Proportion(_) => apply_improvement_notation(score, notation),
        ScoringPopulations::Ratio(p) if p.observations.is_some() => {
            apply_improvement_notation(score, notation)
        }
        _ => score,
    }
}

/// Aggregate methods of the observation populations, looked up by id
struct ObservationMethods {
    numerator: Option<(String, AggregateMethod)>,
    denominator: Option<(String, AggregateMethod)>,
    observation: Option<(String, AggregateMethod)>,
}

impl ObservationMethods {
    fn of(group: &GroupDef, bound: ScoringPopulations) -> Self {
        let describe = |index: usize| {
            let population = group.population_at(index);
            (population.id().to_string(), method_of(population))
        };
        match bound {
            ScoringPopulations::Proportion(p) | ScoringPopulations::Ratio(p) => Self {
                numerator: p.observations.map(|o| describe(o.numerator)),
                denominator: p.observations.map(|o| describe(o.denominator)),
                observation: None,
            },
            ScoringPopulations::ContinuousVariable(c) => Self {
                numerator: None,
                denominator: None,
                observation: c.observation.map(describe),
            },
            ScoringPopulations::Cohort { .. } => Self {
                numerator: None,
                denominator: None,
                observation: None,
            },
        }
    }
}

fn method_of(population: &PopulationDef) -> AggregateMethod {
    population
        .aggregate_method()
        .unwrap_or(AggregateMethod::NotApplicable)
}

fn observation_values<'a>(observations: impl Iterator<Item = &'a QuantityDef>) -> Vec<f64> {
    observations.map(QuantityDef::value).collect()
}

fn aggregate_population(population: &mut PopulationDef) -> MeasureResult<Option<f64>> {
    let values = observation_values(population.observations());
    let result = aggregate(&values, method_of(population))?;
    population.set_aggregation_result(result);
    Ok(result)
}

fn group_proportion(group: &GroupDef, p: &ProportionPopulations) -> Option<f64> {
    let count = |index: Option<usize>| index.map_or(0, |i| group.population_at(i).count());
    proportion_score(
        count(Some(p.numerator)),
        count(p.numerator_exclusion),
        count(Some(p.denominator)),
        count(p.denominator_exclusion),
        count(p.denominator_exception),
    )
}

fn stratum_aggregate(
    stratum: &StratumDef,
    described: &Option<(String, AggregateMethod)>,
) -> MeasureResult<Option<f64>> {
    let Some((id, method)) = described else {
        return Ok(None);
    };
    let values = stratum
        .population_by_id(id)
        .map(|population| population.observation_values())
        .unwrap_or_default();
    aggregate(&values, *method)
}

fn score_stratum(
    stratum: &StratumDef,
    bound: ScoringPopulations,
    methods: &ObservationMethods,
) -> MeasureResult<Option<f64>> {
    match bound {
        ScoringPopulations::Proportion(p) | ScoringPopulations::Ratio(p) => {
            if p.observations.is_some() {
                let numerator = stratum_aggregate(stratum, &methods.numerator)?;
                let denominator = stratum_aggregate(stratum, &methods.denominator)?;
                Ok(ratio_score(numerator, denominator))
            } else {
                Ok(proportion_score(
                    stratum.count(P::Numerator),
                    stratum.count(P::NumeratorExclusion),
                    stratum.count(P::Denominator),
                    stratum.count(P::DenominatorExclusion),
                    stratum.count(P::DenominatorException),
                ))
            }
        }
        ScoringPopulations::ContinuousVariable(_) => {
            stratum_aggregate(stratum, &methods.observation)
        }
        ScoringPopulations::Cohort { .. } => Ok(None),
    }
}
