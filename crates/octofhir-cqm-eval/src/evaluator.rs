//! Membership and scoring state machine
//!
//! Evaluation of one subject against one measure happens in two steps:
//!
//! 1. [`MeasureEvaluator::evaluate_expressions`] asks the expression engine
//!    for every population, stratifier and supplemental-data expression, and
//!    invokes observation and non-subject stratifier functions. Nothing in the
//!    measure is mutated, so this step can run on any worker.
//! 2. [`MeasureEvaluator::evaluate_subject`] applies those results to the
//!    measure's accumulators: population membership, the scoring-type set
//!    algebra, observations, stratifier and SDE results.

use octofhir_cqm_types::{ExpressionValue, QuantityDef, StratifierKind, SubjectRef};

use crate::basis::PopulationBasisValidator;
use crate::collections::MemberSet;
use crate::def::{
    ContinuousVariablePopulations, GroupDef, MeasureDef, PopulationDef, ProportionPopulations,
    ScoringPopulations, StratifierResult,
};
use crate::engine::ExpressionEngine;
use crate::error::{MeasureError, MeasureResult};
use crate::function::{FunctionEvaluator, to_quantity};
use crate::options::MeasureEvaluationOptions;
use crate::result::{CriteriaResult, EvaluationResult};

/// Observations of one measure-observation population, converted and ready
/// to be recorded
struct PreparedObservations {
    population: usize,
    observations: Vec<(ExpressionValue, QuantityDef)>,
    evaluated_resources: Vec<ExpressionValue>,
}

pub struct MeasureEvaluator<'o> {
    options: &'o MeasureEvaluationOptions,
}

impl<'o> MeasureEvaluator<'o> {
    pub fn new(options: &'o MeasureEvaluationOptions) -> Self {
        Self { options }
    }

    /// Evaluate every expression and function `measure` needs for the
    /// engine's current subject
    pub fn evaluate_expressions(
        &self,
        engine: &mut dyn ExpressionEngine,
        measure: &MeasureDef,
        subject: &SubjectRef,
    ) -> MeasureResult<EvaluationResult> {
        let library = measure.library();
        let mut results = EvaluationResult::new();

        for expression in subject_expressions(measure) {
            if results.has_criteria(expression) {
                continue;
            }
            let value = engine
                .evaluate(library, expression)
                .map_err(MeasureError::from_engine);
            let touched: MemberSet = engine.take_evaluated_resources().into_iter().collect();
            results.put_criteria(expression, CriteriaResult::new(value?, touched));
        }

        for group in measure.groups() {
            let mut functions = FunctionEvaluator::new(&mut *engine, library);
            functions.evaluate_observations(group, subject, &mut results)?;
            functions.evaluate_non_subject_stratifiers(group, &mut results)?;
        }

        Ok(results)
    }

    /// Apply one subject's results to `measure`
    pub fn evaluate_subject(
        &self,
        measure: &mut MeasureDef,
        subject: &SubjectRef,
        results: &EvaluationResult,
    ) -> MeasureResult<()> {
        if self.options.validate_population_basis {
            let validator = PopulationBasisValidator::new(measure.url());
            for group in measure.groups() {
                validator.validate_group(group, results)?;
            }
        }

        // Convert observations up front so a bad value leaves no partial state
        let prepared = measure
            .groups()
            .iter()
            .map(|group| prepare_observations(group, results))
            .collect::<MeasureResult<Vec<_>>>()?;

        let key = subject.qualified();
        for (group, observations) in measure.groups_mut().iter_mut().zip(prepared) {
            self.evaluate_group(group, subject, &key, results, observations)?;
        }

        for sde in measure.sdes_mut() {
            if let Some(result) = results.criteria(sde.expression()) {
                sde.put_result(&key, result.clone());
            }
        }
        Ok(())
    }

    fn evaluate_group(
        &self,
        group: &mut GroupDef,
        subject: &SubjectRef,
        key: &str,
        results: &EvaluationResult,
        observations: Vec<PreparedObservations>,
    ) -> MeasureResult<()> {
        let bound = group.scoring_populations()?;
        record_stratifier_results(group, key, results);

        let initial = bound.initial();
        add_criteria(group.population_at_mut(initial), subject, key, results);
        if !group.population_at(initial).has_subject(key) {
            return Ok(());
        }

        log::debug!(
            "Evaluating {} group '{}' for {}",
            bound.scoring(),
            group.id(),
            key
        );

        match bound {
            ScoringPopulations::Proportion(populations) | ScoringPopulations::Ratio(populations) => {
                self.evaluate_proportion(group, populations, subject, key, results, &observations);
            }
            ScoringPopulations::ContinuousVariable(populations) => {
                self.evaluate_continuous_variable(
                    group,
                    populations,
                    subject,
                    key,
                    results,
                    &observations,
                );
            }
            ScoringPopulations::Cohort { .. } => {}
        }
        Ok(())
    }

    fn evaluate_proportion(
        &self,
        group: &mut GroupDef,
        p: ProportionPopulations,
        subject: &SubjectRef,
        key: &str,
        results: &EvaluationResult,
        observations: &[PreparedObservations],
    ) {
        for index in [p.denominator, p.numerator]
            .into_iter()
            .chain(p.denominator_exclusion)
            .chain(p.numerator_exclusion)
            .chain(p.denominator_exception)
        {
            add_criteria(group.population_at_mut(index), subject, key, results);
        }

        if self.options.apply_scoring_set_membership {
            retain(group, p.denominator, p.initial, key);
            retain(group, p.numerator, p.denominator, key);
            if let Some(exclusion) = p.denominator_exclusion {
                remove(group, p.numerator, exclusion, key);
                retain(group, exclusion, p.denominator, key);
            }
            if let Some(exclusion) = p.numerator_exclusion {
                retain(group, exclusion, p.numerator, key);
            }
            if let Some(exception) = p.denominator_exception {
                remove(group, exception, p.numerator, key);
                retain(group, exception, p.denominator, key);
            }
        }

        let mut total_denominator = members_of(group.population_at(p.denominator), key);
        for index in p
            .denominator_exclusion
            .into_iter()
            .chain(p.denominator_exception)
        {
            total_denominator.remove_all(&members_of(group.population_at(index), key));
        }
        let mut total_numerator = members_of(group.population_at(p.numerator), key);
        if let Some(exclusion) = p.numerator_exclusion {
            total_numerator.remove_all(&members_of(group.population_at(exclusion), key));
        }
        for member in total_denominator {
            group.population_at_mut(p.total_denominator).add_resource(key, member);
        }
        for member in total_numerator {
            group.population_at_mut(p.total_numerator).add_resource(key, member);
        }

        if let Some(ratio) = p.observations {
            record_observations(group, ratio.numerator, key, observations);
            record_observations(group, ratio.denominator, key, observations);
            if self.options.apply_scoring_set_membership {
                align_observations(group, ratio.numerator, p.numerator, p.numerator_exclusion, key);
                align_observations(
                    group,
                    ratio.denominator,
                    p.denominator,
                    p.denominator_exclusion,
                    key,
                );
            }
        }
    }

    fn evaluate_continuous_variable(
        &self,
        group: &mut GroupDef,
        c: ContinuousVariablePopulations,
        subject: &SubjectRef,
        key: &str,
        results: &EvaluationResult,
        observations: &[PreparedObservations],
    ) {
        add_criteria(group.population_at_mut(c.measure_population), subject, key, results);
        if let Some(exclusion) = c.exclusion {
            add_criteria(group.population_at_mut(exclusion), subject, key, results);
        }

        if self.options.apply_scoring_set_membership {
            retain(group, c.measure_population, c.initial, key);
            if let Some(exclusion) = c.exclusion {
                retain(group, exclusion, c.measure_population, key);
            }
        }

        if let Some(observation) = c.observation {
            record_observations(group, observation, key, observations);
            if self.options.apply_scoring_set_membership {
                align_observations(group, observation, c.measure_population, c.exclusion, key);
            }
        }
    }
}

/// Expressions evaluated in subject context: populations, criteria and
/// value stratifiers, supplemental data elements
fn subject_expressions(measure: &MeasureDef) -> Vec<&str> {
    let mut expressions = Vec::new();
    for group in measure.groups() {
        expressions.extend(
            group
                .populations()
                .iter()
                .filter(|population| !population.is_observation())
                .filter_map(PopulationDef::expression),
        );
        for stratifier in group.stratifiers() {
            if stratifier.kind() != StratifierKind::NonSubjectValue {
                expressions.extend(stratifier.expressions());
            }
        }
    }
    expressions.extend(measure.sdes().iter().map(|sde| sde.expression()));
    expressions
}

fn prepare_observations(
    group: &GroupDef,
    results: &EvaluationResult,
) -> MeasureResult<Vec<PreparedObservations>> {
    let mut prepared = Vec::new();
    for (index, population) in group.populations().iter().enumerate() {
        if !population.is_observation() {
            continue;
        }
        let Some(function) = population.expression() else {
            continue;
        };
        let Some(function_result) =
            results.function(&EvaluationResult::function_key(population.id(), function))
        else {
            continue;
        };

        let mut observations = Vec::with_capacity(function_result.values.len());
        for (input, value) in function_result.values.iter() {
            match to_quantity(function, value)? {
                Some(quantity) => observations.push((input.clone(), quantity)),
                None => log::warn!(
                    "Measure observation {} returned null for {}, skipping",
                    function,
                    input
                ),
            }
        }
        prepared.push(PreparedObservations {
            population: index,
            observations,
            evaluated_resources: function_result.evaluated_resources.iter().cloned().collect(),
        });
    }
    Ok(prepared)
}

fn add_criteria(
    population: &mut PopulationDef,
    subject: &SubjectRef,
    key: &str,
    results: &EvaluationResult,
) {
    let Some(result) = population
        .expression()
        .and_then(|expression| results.criteria(expression))
    else {
        return;
    };

    if population.is_boolean_basis() {
        if result.value.is_truthy() {
            population.add_resource(key, subject.to_value());
        }
    } else {
        for member in result.members() {
            population.add_resource(key, member.clone());
        }
    }
    population.add_evaluated_resources(result.evaluated_resources.iter().cloned());
}

fn members_of(population: &PopulationDef, key: &str) -> MemberSet {
    population
        .resources_for_subject(key)
        .cloned()
        .unwrap_or_default()
}

/// `target ∩= source` for the subject
fn retain(group: &mut GroupDef, target: usize, source: usize, key: &str) {
    let boolean_basis = group.is_boolean_basis();
    let (target, source) = group.populations_pair_mut(target, source);
    if boolean_basis {
        target.retain_subject_in(key, source);
    } else {
        target.retain_all_resources(key, source);
    }
}

/// `target −= source` for the subject
fn remove(group: &mut GroupDef, target: usize, source: usize, key: &str) {
    let boolean_basis = group.is_boolean_basis();
    let (target, source) = group.populations_pair_mut(target, source);
    if boolean_basis {
        target.remove_subject_in(key, source);
    } else {
        target.remove_all_resources(key, source);
    }
}

fn record_observations(
    group: &mut GroupDef,
    index: usize,
    key: &str,
    prepared: &[PreparedObservations],
) {
    let Some(prepared) = prepared.iter().find(|p| p.population == index) else {
        return;
    };
    let population = group.population_at_mut(index);
    for (input, quantity) in &prepared.observations {
        population.add_observation(key, input.clone(), quantity.clone());
    }
    population.add_evaluated_resources(prepared.evaluated_resources.iter().cloned());
}

/// Keep the observations whose input is still in `observed` and not in
/// `exclusion`
fn align_observations(
    group: &mut GroupDef,
    observation: usize,
    observed: usize,
    exclusion: Option<usize>,
    key: &str,
) {
    if !group.population_at(observation).has_subject(key) {
        return;
    }
    let (target, observed) = group.populations_pair_mut(observation, observed);
    target.retain_observations_in(key, observed);
    if let Some(exclusion) = exclusion {
        let (target, exclusion) = group.populations_pair_mut(observation, exclusion);
        target.remove_observations_in(key, exclusion);
    }
}

fn record_stratifier_results(group: &mut GroupDef, key: &str, results: &EvaluationResult) {
    for stratifier in group.stratifiers_mut() {
        let kind = stratifier.kind();
        let own = stratifier
            .expression()
            .and_then(|expression| stratifier_result(kind, stratifier.id(), expression, results));
        if let Some(result) = own {
            stratifier.put_result(key, result);
        }
        for component in stratifier.components_mut() {
            if let Some(result) =
                stratifier_result(kind, component.id(), component.expression(), results)
            {
                component.put_result(key, result);
            }
        }
    }
}

fn stratifier_result(
    kind: StratifierKind,
    owner: &str,
    expression: &str,
    results: &EvaluationResult,
) -> Option<StratifierResult> {
    match kind {
        StratifierKind::NonSubjectValue => results
            .function(&EvaluationResult::function_key(owner, expression))
            .map(|result| StratifierResult::PerInput {
                values: result.values.clone(),
                evaluated_resources: result.evaluated_resources.clone(),
            }),
        StratifierKind::Criteria | StratifierKind::Value => {
            let result = results.criteria(expression)?;
            if result.value.is_null() {
                log::warn!(
                    "Stratifier '{}' expression {} returned null, skipping",
                    owner,
                    expression
                );
                return None;
            }
            Some(StratifierResult::Subject(result.clone()))
        }
    }
}
