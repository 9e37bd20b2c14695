//! Raw expression outcomes gathered for one subject

use indexmap::IndexMap;
use octofhir_cqm_types::ExpressionValue;

use crate::collections::{MemberMap, MemberSet};

/// Outcome of a named expression plus the resources the engine touched
#[derive(Debug, Clone, Default)]
pub struct CriteriaResult {
    pub value: ExpressionValue,
    pub evaluated_resources: MemberSet,
}

impl CriteriaResult {
    pub fn new(value: ExpressionValue, evaluated_resources: MemberSet) -> Self {
        Self {
            value,
            evaluated_resources,
        }
    }

    /// Elements of the result: list members, nothing for null, else the value
    pub fn members(&self) -> impl Iterator<Item = &ExpressionValue> {
        self.value.iter_members().filter(|value| !value.is_null())
    }
}

/// Function outcomes keyed by the argument they were invoked with
#[derive(Debug, Clone, Default)]
pub struct FunctionResult {
    pub values: MemberMap<ExpressionValue>,
    pub evaluated_resources: MemberSet,
}

/// Everything evaluated for one subject and one measure
#[derive(Debug, Clone, Default)]
pub struct EvaluationResult {
    criteria: IndexMap<String, CriteriaResult>,
    functions: IndexMap<String, FunctionResult>,
}

impl EvaluationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the results of `expression` invoked on behalf of `owner`
    /// (a population or stratifier component id)
    pub fn function_key(owner: &str, expression: &str) -> String {
        format!("{}-{}", owner, expression)
    }

    pub fn put_criteria(&mut self, expression: impl Into<String>, result: CriteriaResult) {
        self.criteria.insert(expression.into(), result);
    }

    pub fn criteria(&self, expression: &str) -> Option<&CriteriaResult> {
        self.criteria.get(expression)
    }

    pub fn has_criteria(&self, expression: &str) -> bool {
        self.criteria.contains_key(expression)
    }

    pub fn put_function(&mut self, key: impl Into<String>, result: FunctionResult) {
        self.functions.insert(key.into(), result);
    }

    pub fn function(&self, key: &str) -> Option<&FunctionResult> {
        self.functions.get(key)
    }

    pub fn criteria_results(&self) -> impl Iterator<Item = (&str, &CriteriaResult)> {
        self.criteria.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn function_results(&self) -> impl Iterator<Item = (&str, &FunctionResult)> {
        self.functions.iter().map(|(key, result)| (key.as_str(), result))
    }
}
