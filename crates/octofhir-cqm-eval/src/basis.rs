//! Population basis validation
//!
//! Checks, before anything is accumulated for a subject, that every
//! population and stratifier result has the shape the group basis expects:
//! booleans for a boolean basis, resources of the named type otherwise.

use octofhir_cqm_types::{ExpressionValue, PopulationBasis, StratifierKind};

use crate::def::GroupDef;
use crate::error::{MeasureError, MeasureResult};
use crate::result::{CriteriaResult, EvaluationResult};

pub struct PopulationBasisValidator<'a> {
    measure_url: &'a str,
}

impl<'a> PopulationBasisValidator<'a> {
    pub fn new(measure_url: &'a str) -> Self {
        Self { measure_url }
    }

    /// Validate every population and stratifier result of `group`
    pub fn validate_group(&self, group: &GroupDef, results: &EvaluationResult) -> MeasureResult<()> {
        for population in group.populations() {
            if population.is_observation() {
                continue;
            }
            let Some(expression) = population.expression() else {
                continue;
            };
            if let Some(result) = results.criteria(expression) {
                self.validate_criteria(group.basis(), expression, result)?;
            }
        }

        for stratifier in group.stratifiers() {
            for expression in stratifier.expressions() {
                let Some(result) = results.criteria(expression) else {
                    continue;
                };
                match stratifier.kind() {
                    StratifierKind::Criteria => {
                        self.validate_criteria(group.basis(), expression, result)?
                    }
                    StratifierKind::Value => {
                        self.validate_stratifier_value(group.basis(), expression, result)?
                    }
                    StratifierKind::NonSubjectValue => {}
                }
            }
        }
        Ok(())
    }

    fn validate_criteria(
        &self,
        basis: &PopulationBasis,
        expression: &str,
        result: &CriteriaResult,
    ) -> MeasureResult<()> {
        match basis {
            PopulationBasis::Boolean => match &result.value {
                ExpressionValue::Null | ExpressionValue::Boolean(_) => Ok(()),
                other => Err(self.mismatch(expression, basis, other.type_name())),
            },
            PopulationBasis::Resource(resource_type) => {
                match result.members().find(|member| {
                    member
                        .as_resource()
                        .is_none_or(|resource| &resource.resource_type != resource_type)
                }) {
                    Some(member) => Err(self.mismatch(expression, basis, member.type_name())),
                    None => Ok(()),
                }
            }
        }
    }

    fn validate_stratifier_value(
        &self,
        basis: &PopulationBasis,
        expression: &str,
        result: &CriteriaResult,
    ) -> MeasureResult<()> {
        match result.members().find(|member| !member.is_scalar()) {
            Some(member) => Err(MeasureError::invalid_result(
                expression,
                format!(
                    "stratifier result type {} is not supported with population basis {} for measure {}",
                    member.type_name(),
                    basis,
                    self.measure_url
                ),
            )),
            None => Ok(()),
        }
    }

    fn mismatch(&self, expression: &str, basis: &PopulationBasis, found: &str) -> MeasureError {
        MeasureError::invalid_result(
            expression,
            format!(
                "result type {} does not match population basis {} for measure {}",
                found, basis, self.measure_url
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::MemberSet;
    use crate::def::{PopulationDef, StratifierDef};
    use indexmap::IndexMap;
    use octofhir_cqm_types::MeasurePopulationType;

    const URL: &str = "http://example.org/Measure/m";

    fn group(basis: PopulationBasis) -> GroupDef {
        GroupDef::new(
            "g1",
            basis,
            vec![PopulationDef::new(
                "ip",
                MeasurePopulationType::InitialPopulation,
                "Initial Population",
            )],
        )
        .with_stratifier(StratifierDef::new("s1", StratifierKind::Value, "Age Group"))
    }

    fn results(ip: ExpressionValue, stratifier: ExpressionValue) -> EvaluationResult {
        let mut results = EvaluationResult::new();
        results.put_criteria("Initial Population", CriteriaResult::new(ip, MemberSet::new()));
        results.put_criteria("Age Group", CriteriaResult::new(stratifier, MemberSet::new()));
        results
    }

    #[test]
    fn test_boolean_basis() {
        let validator = PopulationBasisValidator::new(URL);
        let group = group(PopulationBasis::Boolean);
        assert!(
            validator
                .validate_group(&group, &results(true.into(), "40-49".into()))
                .is_ok()
        );

        let err = validator
            .validate_group(
                &group,
                &results(ExpressionValue::resource("Encounter", "1"), "40-49".into()),
            )
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("Encounter"));
        assert!(err.to_string().contains(URL));
    }

    #[test]
    fn test_resource_basis_requires_named_type() {
        let validator = PopulationBasisValidator::new(URL);
        let group = group(PopulationBasis::Resource("Encounter".to_string()));
        let encounters = ExpressionValue::list(vec![
            ExpressionValue::resource("Encounter", "1"),
            ExpressionValue::resource("Encounter", "2"),
        ]);
        assert!(
            validator
                .validate_group(&group, &results(encounters, ExpressionValue::Null))
                .is_ok()
        );

        let mixed = ExpressionValue::list(vec![
            ExpressionValue::resource("Encounter", "1"),
            ExpressionValue::resource("Procedure", "2"),
        ]);
        assert!(
            validator
                .validate_group(&group, &results(mixed, ExpressionValue::Null))
                .is_err()
        );
    }

    #[test]
    fn test_tuple_stratifier_rejected() {
        let validator = PopulationBasisValidator::new(URL);
        let group = group(PopulationBasis::Boolean);
        let mut tuple = IndexMap::new();
        tuple.insert("a".to_string(), ExpressionValue::from(1i64));
        let err = validator
            .validate_group(&group, &results(true.into(), ExpressionValue::Tuple(tuple)))
            .unwrap_err();
        assert!(matches!(err, MeasureError::InvalidResult { .. }));
    }
}
