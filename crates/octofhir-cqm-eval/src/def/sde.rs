//! Supplemental data elements

use indexmap::IndexMap;
use octofhir_cqm_types::{ConceptDef, ExpressionValue};

use crate::result::CriteriaResult;

/// Expression reported alongside the populations, one result per subject
#[derive(Debug, Clone)]
pub struct SdeDef {
    id: String,
    code: Option<ConceptDef>,
    expression: String,
    results: IndexMap<String, CriteriaResult>,
}

impl SdeDef {
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

    /// Record a subject's result; `[null]` is stored as null
    pub fn put_result(&mut self, subject: &str, mut result: CriteriaResult) {
        if let Some([only]) = result.value.as_list() {
            if only.is_null() {
                result.value = ExpressionValue::Null;
            }
        }
        self.results.insert(subject.to_string(), result);
    }

    pub fn results(&self) -> &IndexMap<String, CriteriaResult> {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::MemberSet;

    #[test]
    fn test_singleton_null_normalised() {
        let mut sde = SdeDef::new("sde-payer", "SDE Payer");
        sde.put_result(
            "Patient/a",
            CriteriaResult::new(ExpressionValue::list(vec![ExpressionValue::Null]), MemberSet::new()),
        );
        sde.put_result(
            "Patient/b",
            CriteriaResult::new(ExpressionValue::list(vec![ExpressionValue::from("Medicaid")]), MemberSet::new()),
        );
        assert!(sde.results()["Patient/a"].value.is_null());
        assert!(sde.results()["Patient/b"].value.is_list());
    }
}
