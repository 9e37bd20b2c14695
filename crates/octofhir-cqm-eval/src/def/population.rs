//! Population definitions and their per-subject accumulators

use indexmap::IndexMap;
use octofhir_cqm_types::{
    AggregateMethod, ConceptDef, ExpressionValue, MeasurePopulationType, QuantityDef,
};

use crate::collections::{MemberMap, MemberSet};

/// One population of a group plus the members accumulated for it.
///
/// Membership is stored per subject (qualified `Type/id`) as a set of
/// resources. Boolean-basis populations hold a single reference to the
/// subject itself. Measure-observation populations additionally map each
/// observed input resource to its `QuantityDef`; the input sets and the
/// observation maps are kept in step.
#[derive(Debug, Clone)]
pub struct PopulationDef {
    id: String,
    code: Option<ConceptDef>,
    population_type: MeasurePopulationType,
    expression: Option<String>,
    criteria_reference: Option<String>,
    aggregate_method: Option<AggregateMethod>,
    boolean_basis: bool,
    subject_resources: IndexMap<String, MemberSet>,
    subject_observations: IndexMap<String, MemberMap<QuantityDef>>,
    evaluated_resources: MemberSet,
    aggregation_result: Option<f64>,
}

impl PopulationDef {
    pub fn new(
        id: impl Into<String>,
        population_type: MeasurePopulationType,
        expression: impl Into<String>,
    ) -> Self {
        Self::build(id.into(), population_type, Some(expression.into()))
    }

    /// Engine-derived total population, without an expression
    pub fn total(population_type: MeasurePopulationType) -> Self {
        Self::build(population_type.code().to_string(), population_type, None)
    }

    fn build(id: String, population_type: MeasurePopulationType, expression: Option<String>) -> Self {
        Self {
            id,
            code: None,
            population_type,
            expression,
            criteria_reference: None,
            aggregate_method: None,
            boolean_basis: true,
            subject_resources: IndexMap::new(),
            subject_observations: IndexMap::new(),
            evaluated_resources: MemberSet::new(),
            aggregation_result: None,
        }
    }

    pub fn with_code(mut self, code: ConceptDef) -> Self {
        self.code = Some(code);
        self
    }

    /// Id of the population a measure-observation observes
    pub fn with_criteria_reference(mut self, population_id: impl Into<String>) -> Self {
        self.criteria_reference = Some(population_id.into());
        self
    }

    pub fn with_aggregate_method(mut self, method: AggregateMethod) -> Self {
        self.aggregate_method = Some(method);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> Option<&ConceptDef> {
        self.code.as_ref()
    }

    pub fn population_type(&self) -> MeasurePopulationType {
        self.population_type
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn criteria_reference(&self) -> Option<&str> {
        self.criteria_reference.as_deref()
    }

    pub fn aggregate_method(&self) -> Option<AggregateMethod> {
        self.aggregate_method
    }

    pub fn is_boolean_basis(&self) -> bool {
        self.boolean_basis
    }

    pub(crate) fn set_boolean_basis(&mut self, boolean_basis: bool) {
        self.boolean_basis = boolean_basis;
    }

    pub fn is_observation(&self) -> bool {
        self.population_type == MeasurePopulationType::MeasureObservation
    }

    // ------------------------------------------------------------------
    // Accumulation
    // ------------------------------------------------------------------

    /// Record `value` as qualifying for `subject`
    pub fn add_resource(&mut self, subject: &str, value: ExpressionValue) -> bool {
        self.subject_resources
            .entry(subject.to_string())
            .or_default()
            .insert(value)
    }

    /// Record an observation of `input` for `subject`
    pub fn add_observation(&mut self, subject: &str, input: ExpressionValue, observation: QuantityDef) {
        self.subject_resources
            .entry(subject.to_string())
            .or_default()
            .insert(input.clone());
        self.subject_observations
            .entry(subject.to_string())
            .or_default()
            .insert(input, observation);
    }

    pub fn add_evaluated_resources(&mut self, resources: impl IntoIterator<Item = ExpressionValue>) {
        self.evaluated_resources.extend(resources);
    }

    pub fn evaluated_resources(&self) -> &MemberSet {
        &self.evaluated_resources
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Subjects with at least one entry, in first-seen order
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subject_resources.keys().map(String::as_str)
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.subject_resources.contains_key(subject)
    }

    pub fn resources_for_subject(&self, subject: &str) -> Option<&MemberSet> {
        self.subject_resources.get(subject)
    }

    /// Union of every subject's resources
    pub fn resources(&self) -> MemberSet {
        self.subject_resources
            .values()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    /// Every (subject, resource) entry, duplicates across subjects included
    pub fn subject_resource_entries(&self) -> impl Iterator<Item = (&str, &ExpressionValue)> {
        self.subject_resources
            .iter()
            .flat_map(|(subject, set)| set.iter().map(move |value| (subject.as_str(), value)))
    }

    pub fn observations_for_subject(&self, subject: &str) -> Option<&MemberMap<QuantityDef>> {
        self.subject_observations.get(subject)
    }

    pub fn observations(&self) -> impl Iterator<Item = &QuantityDef> {
        self.subject_observations.values().flat_map(MemberMap::values)
    }

    /// Membership count under the population's basis
    pub fn count(&self) -> usize {
        if self.is_observation() {
            self.subject_observations.values().map(MemberMap::len).sum()
        } else if self.boolean_basis {
            self.subject_resources.len()
        } else {
            self.subject_resources.values().map(MemberSet::len).sum()
        }
    }

    pub fn aggregation_result(&self) -> Option<f64> {
        self.aggregation_result
    }

    pub fn set_aggregation_result(&mut self, result: Option<f64>) {
        self.aggregation_result = result;
    }

    // ------------------------------------------------------------------
    // Set algebra
    // ------------------------------------------------------------------

    /// Keep only subjects also present in `other`
    pub fn retain_all_subjects(&mut self, other: &PopulationDef) {
        self.subject_resources
            .retain(|subject, _| other.has_subject(subject));
        self.subject_observations
            .retain(|subject, _| other.has_subject(subject));
    }

    /// Drop every subject present in `other`
    pub fn remove_all_subjects(&mut self, other: &PopulationDef) {
        self.subject_resources
            .retain(|subject, _| !other.has_subject(subject));
        self.subject_observations
            .retain(|subject, _| !other.has_subject(subject));
    }

    pub fn remove_subject(&mut self, subject: &str) {
        self.subject_resources.shift_remove(subject);
        self.subject_observations.shift_remove(subject);
    }

    /// Drop `subject` unless `other` also holds it
    pub fn retain_subject_in(&mut self, subject: &str, other: &PopulationDef) {
        if !other.has_subject(subject) {
            self.remove_subject(subject);
        }
    }

    /// Drop `subject` when `other` holds it
    pub fn remove_subject_in(&mut self, subject: &str, other: &PopulationDef) {
        if other.has_subject(subject) {
            self.remove_subject(subject);
        }
    }

    /// Keep only this subject's resources that `other` also holds for it
    pub fn retain_all_resources(&mut self, subject: &str, other: &PopulationDef) {
        let empty = MemberSet::new();
        let keep = other.resources_for_subject(subject).unwrap_or(&empty);
        if let Some(set) = self.subject_resources.get_mut(subject) {
            set.retain_all(keep);
        }
        self.prune_observations(subject);
    }

    /// Drop this subject's resources that `other` holds for it
    pub fn remove_all_resources(&mut self, subject: &str, other: &PopulationDef) {
        let Some(drop) = other.resources_for_subject(subject) else {
            return;
        };
        if let Some(set) = self.subject_resources.get_mut(subject) {
            set.remove_all(drop);
        }
        self.prune_observations(subject);
    }

    /// Keep observations whose input is one of `other`'s resources for the
    /// subject; a subject `other` does not hold loses all its observations.
    pub fn retain_observations_in(&mut self, subject: &str, other: &PopulationDef) {
        match other.resources_for_subject(subject) {
            Some(keep) if !keep.is_empty() => {
                if let Some(set) = self.subject_resources.get_mut(subject) {
                    set.retain_all(keep);
                }
                self.prune_observations(subject);
            }
            _ => self.remove_subject(subject),
        }
    }

    /// Drop observations whose input is one of `other`'s resources for the subject
    pub fn remove_observations_in(&mut self, subject: &str, other: &PopulationDef) {
        if let Some(drop) = other.resources_for_subject(subject) {
            if let Some(set) = self.subject_resources.get_mut(subject) {
                set.remove_all(drop);
            }
            self.prune_observations(subject);
        }
    }

    /// Bring the observation map of `subject` in line with its input set.
    /// Observation populations drop a subject once nothing is left for it.
    fn prune_observations(&mut self, subject: &str) {
        if !self.is_observation() {
            return;
        }
        let inputs = self.subject_resources.get(subject).cloned().unwrap_or_default();
        if let Some(observations) = self.subject_observations.get_mut(subject) {
            observations.retain_keys(&inputs);
            if observations.is_empty() {
                self.subject_observations.shift_remove(subject);
            }
        }
        if inputs.is_empty() {
            self.subject_resources.shift_remove(subject);
        }
    }
}
