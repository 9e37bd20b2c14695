//! Stratifier definitions and their per-subject results

use indexmap::IndexMap;
use octofhir_cqm_types::{ConceptDef, ExpressionValue, StratifierKind};

use super::stratum::StratumDef;
use crate::collections::{MemberMap, MemberSet};
use crate::error::{MeasureError, MeasureResult};
use crate::result::CriteriaResult;

/// Raw result a stratifier (or one of its components) produced for a subject
#[derive(Debug, Clone)]
pub enum StratifierResult {
    /// Subject-context expression result
    Subject(CriteriaResult),
    /// Function result per population resource
    PerInput {
        values: MemberMap<ExpressionValue>,
        evaluated_resources: MemberSet,
    },
}

impl StratifierResult {
    pub fn evaluated_resources(&self) -> &MemberSet {
        match self {
            Self::Subject(result) => &result.evaluated_resources,
            Self::PerInput {
                evaluated_resources,
                ..
            } => evaluated_resources,
        }
    }
}

/// One dimension of a composite stratifier
#[derive(Debug, Clone)]
pub struct StratifierComponentDef {
    id: String,
    code: Option<ConceptDef>,
    expression: String,
    results: IndexMap<String, StratifierResult>,
}

impl StratifierComponentDef {
    pub fn new(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: None,
            expression: expression.into(),
            results: IndexMap::new(),
        }
    }

    pub fn with_code(mut self, code: ConceptDef) -> Self {
        self.code = Some(code);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> Option<&ConceptDef> {
        self.code.as_ref()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn put_result(&mut self, subject: &str, result: StratifierResult) {
        self.results.insert(subject.to_string(), result);
    }

    pub fn results(&self) -> &IndexMap<String, StratifierResult> {
        &self.results
    }
}

/// A stratifier: one expression, or a list of components whose value
/// tuples define the strata
#[derive(Debug, Clone)]
pub struct StratifierDef {
    id: String,
    code: Option<ConceptDef>,
    kind: StratifierKind,
    expression: Option<String>,
    components: Vec<StratifierComponentDef>,
    results: IndexMap<String, StratifierResult>,
    strata: Vec<StratumDef>,
}

impl StratifierDef {
    /// Single-expression stratifier
    pub fn new(id: impl Into<String>, kind: StratifierKind, expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: None,
            kind,
            expression: Some(expression.into()),
            components: Vec::new(),
            results: IndexMap::new(),
            strata: Vec::new(),
        }
    }

    /// Composite stratifier
    pub fn with_components(
        id: impl Into<String>,
        kind: StratifierKind,
        components: Vec<StratifierComponentDef>,
    ) -> Self {
        Self {
            id: id.into(),
            code: None,
            kind,
            expression: None,
            components,
            results: IndexMap::new(),
            strata: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: ConceptDef) -> Self {
        self.code = Some(code);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> Option<&ConceptDef> {
        self.code.as_ref()
    }

    pub fn kind(&self) -> StratifierKind {
        self.kind
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn is_component(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn components(&self) -> &[StratifierComponentDef] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [StratifierComponentDef] {
        &mut self.components
    }

    /// Every expression the stratifier evaluates, its own or its components'
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.expression
            .as_deref()
            .into_iter()
            .chain(self.components.iter().map(StratifierComponentDef::expression))
    }

    pub fn put_result(&mut self, subject: &str, result: StratifierResult) {
        self.results.insert(subject.to_string(), result);
    }

    pub fn results(&self) -> &IndexMap<String, StratifierResult> {
        &self.results
    }

    /// Strata computed by the stratification pass; empty before it runs
    pub fn strata(&self) -> &[StratumDef] {
        &self.strata
    }

    pub fn strata_mut(&mut self) -> &mut [StratumDef] {
        &mut self.strata
    }

    pub(crate) fn set_strata(&mut self, strata: Vec<StratumDef>) {
        self.strata = strata;
    }

    pub(crate) fn validate(&self, group_id: &str, boolean_basis: bool) -> MeasureResult<()> {
        if self.expression.is_some() == self.is_component() {
            return Err(MeasureError::invalid_request(format!(
                "Stratifier '{}' of group '{}' must have either an expression or components",
                self.id, group_id
            )));
        }
        match self.kind {
            StratifierKind::Criteria if self.is_component() => {
                Err(MeasureError::invalid_request(format!(
                    "Criteria stratifier '{}' of group '{}' cannot have components",
                    self.id, group_id
                )))
            }
            StratifierKind::NonSubjectValue if boolean_basis => {
                Err(MeasureError::invalid_request(format!(
                    "Non-subject value stratifier '{}' of group '{}' requires a resource population basis",
                    self.id, group_id
                )))
            }
            _ => Ok(()),
        }
    }
}
