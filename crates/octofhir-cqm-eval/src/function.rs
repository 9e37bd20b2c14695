//! Function evaluation for measure observations and non-subject stratifiers
//!
//! Measure observations and non-subject-value stratifier components are
//! library functions taking one operand. They are invoked once per
//! qualifying resource (or once per subject without an operand on a boolean
//! basis) and their results are stored on the subject's
//! [`EvaluationResult`] under [`EvaluationResult::function_key`].

use octofhir_cqm_types::{ExpressionValue, MeasurePopulationType, QuantityDef, StratifierKind, SubjectRef};

use crate::collections::MemberSet;
use crate::def::{GroupDef, PopulationDef};
use crate::engine::{ExpressionEngine, ExpressionKind, LibraryIdentifier};
use crate::error::{MeasureError, MeasureResult};
use crate::result::{EvaluationResult, FunctionResult};

pub struct FunctionEvaluator<'a> {
    engine: &'a mut dyn ExpressionEngine,
    library: &'a LibraryIdentifier,
}

impl<'a> FunctionEvaluator<'a> {
    pub fn new(engine: &'a mut dyn ExpressionEngine, library: &'a LibraryIdentifier) -> Self {
        Self { engine, library }
    }

    fn kind_of(&self, name: &str) -> MeasureResult<ExpressionKind> {
        self.engine
            .expression_kind(self.library, name)
            .map_err(MeasureError::from_engine)
    }

    fn require_function(&self, name: &str) -> MeasureResult<()> {
        match self.kind_of(name)? {
            ExpressionKind::Function => Ok(()),
            ExpressionKind::Scalar => Err(MeasureError::invalid_request(format!(
                "Measure observation {} does not reference a function definition in library {}",
                name, self.library
            ))),
        }
    }

    /// Invoke `function` and drain the resources it touched
    pub fn invoke(
        &mut self,
        function: &str,
        argument: Option<&ExpressionValue>,
    ) -> MeasureResult<(ExpressionValue, Vec<ExpressionValue>)> {
        self.require_function(function)?;
        let value = self
            .engine
            .invoke_function(self.library, function, argument)
            .map_err(MeasureError::from_engine);
        let touched = self.engine.take_evaluated_resources();
        Ok((value?, touched))
    }

    /// Evaluate every measure-observation function of `group` over the raw
    /// result of the population it observes
    pub fn evaluate_observations(
        &mut self,
        group: &GroupDef,
        subject: &SubjectRef,
        results: &mut EvaluationResult,
    ) -> MeasureResult<()> {
        for observation in group.populations_of(MeasurePopulationType::MeasureObservation) {
            let Some(function) = observation.expression() else {
                continue;
            };
            let Some(observed) = observed_population(group, observation) else {
                continue;
            };
            let Some(observed_result) = observed.expression().and_then(|e| results.criteria(e))
            else {
                continue;
            };

            let mut function_result = FunctionResult::default();
            if group.is_boolean_basis() {
                if observed_result.value.is_truthy() {
                    let (value, touched) = self.invoke(function, None)?;
                    function_result.values.insert(subject.to_value(), value);
                    function_result.evaluated_resources.extend(touched);
                }
            } else {
                let inputs: Vec<ExpressionValue> = observed_result.members().cloned().collect();
                for input in inputs {
                    let (value, touched) = self.invoke(function, Some(&input))?;
                    function_result.values.insert(input, value);
                    function_result.evaluated_resources.extend(touched);
                }
            }
            results.put_function(
                EvaluationResult::function_key(observation.id(), function),
                function_result,
            );
        }
        Ok(())
    }

    /// Evaluate non-subject-value stratifier functions once per resource
    /// produced by any population of `group`
    pub fn evaluate_non_subject_stratifiers(
        &mut self,
        group: &GroupDef,
        results: &mut EvaluationResult,
    ) -> MeasureResult<()> {
        let stratifiers: Vec<_> = group
            .stratifiers()
            .iter()
            .filter(|stratifier| stratifier.kind() == StratifierKind::NonSubjectValue)
            .collect();
        if stratifiers.is_empty() {
            return Ok(());
        }

        let inputs: MemberSet = group
            .populations()
            .iter()
            .filter(|population| !population.is_observation())
            .filter_map(|population| population.expression())
            .filter_map(|expression| results.criteria(expression))
            .flat_map(|result| result.members().cloned())
            .collect();

        for stratifier in stratifiers {
            let owners: Vec<(&str, &str)> = match stratifier.expression() {
                Some(expression) => vec![(stratifier.id(), expression)],
                None => stratifier
                    .components()
                    .iter()
                    .map(|component| (component.id(), component.expression()))
                    .collect(),
            };
            for (owner, function) in owners {
                let mut function_result = FunctionResult::default();
                for input in &inputs {
                    let (value, touched) = self.invoke(function, Some(input))?;
                    function_result.values.insert(input.clone(), value);
                    function_result.evaluated_resources.extend(touched);
                }
                results.put_function(EvaluationResult::function_key(owner, function), function_result);
            }
        }
        Ok(())
    }

    /// Criteria and value stratifiers must be plain expressions;
    /// non-subject-value stratifiers must be functions
    pub fn validate_stratifier_expression_kinds(&self, group: &GroupDef) -> MeasureResult<()> {
        for stratifier in group.stratifiers() {
            let expected = match stratifier.kind() {
                StratifierKind::Criteria | StratifierKind::Value => ExpressionKind::Scalar,
                StratifierKind::NonSubjectValue => ExpressionKind::Function,
            };
            for expression in stratifier.expressions() {
                if self.kind_of(expression)? != expected {
                    let requirement = match expected {
                        ExpressionKind::Scalar => "must not be a function",
                        ExpressionKind::Function => "must be a function",
                    };
                    return Err(MeasureError::invalid_request(format!(
                        "Stratifier '{}' of group '{}' uses expression '{}' which {} for {} stratifiers",
                        stratifier.id(),
                        group.id(),
                        expression,
                        requirement,
                        stratifier.kind()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every measure-observation expression must be a library function
    pub fn validate_observation_expression_kinds(&self, group: &GroupDef) -> MeasureResult<()> {
        group
            .populations_of(MeasurePopulationType::MeasureObservation)
            .filter_map(PopulationDef::expression)
            .try_for_each(|function| self.require_function(function))
    }
}

/// Population a measure observation observes: its criteria reference, or the
/// measure population of a continuous-variable group
pub fn observed_population<'g>(
    group: &'g GroupDef,
    observation: &PopulationDef,
) -> Option<&'g PopulationDef> {
    match observation.criteria_reference() {
        Some(reference) => group.population_by_id(reference),
        None => group.population(MeasurePopulationType::MeasurePopulation),
    }
}

/// Convert a function result into an observation; null yields nothing
pub fn to_quantity(expression: &str, value: &ExpressionValue) -> MeasureResult<Option<QuantityDef>> {
    match value {
        ExpressionValue::Null => Ok(None),
        ExpressionValue::Quantity(quantity) => {
            let number = value.as_number().ok_or_else(|| {
                MeasureError::invalid_result(expression, format!("{} is not a valid number", quantity.value))
            })?;
            Ok(Some(match &quantity.unit {
                Some(unit) => QuantityDef::with_unit(number, unit.clone()),
                None => QuantityDef::new(number),
            }))
        }
        ExpressionValue::Integer(_) | ExpressionValue::Decimal(_) => value
            .as_number()
            .map(|number| Some(QuantityDef::new(number)))
            .ok_or_else(|| MeasureError::invalid_result(expression, format!("{} is not a valid number", value))),
        ExpressionValue::String(s) => match s.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Some(QuantityDef::new(number))),
            _ => Err(MeasureError::invalid_result(
                expression,
                format!("String is not a valid number: {}", s),
            )),
        },
        other => Err(MeasureError::invalid_result(
            expression,
            format!(
                "Measure observation result of type {} cannot be converted to a number",
                other.type_name()
            ),
        )),
    }
}
