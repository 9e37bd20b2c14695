//! Stratification engine
//!
//! Runs once per group after every subject has been applied. Each
//! stratifier partitions the group into strata and every stratum receives a
//! slice of each group population.
//!
//! Value and component stratifiers build a table of rows keyed by subject
//! (or by subject and input resource for non-subject-value stratifiers) and
//! group the rows by the complete tuple of component values they carry. A
//! criteria stratifier yields a single stratum whose slices intersect each
//! population with the stratifier's own result.

use indexmap::IndexMap;
use octofhir_cqm_types::{ConceptDef, ExpressionValue, MemberKey, StratifierKind};
use smallvec::SmallVec;
use std::collections::HashSet;

use crate::collections::MemberSet;
use crate::def::{
    GroupDef, MeasureDef, PopulationDef, StratifierDef, StratifierResult, StratumDef,
    StratumPopulationDef, StratumValueDef,
};

/// Which of a subject's members fall into a stratum
#[derive(Debug, Clone)]
enum Scope {
    /// Everything the subject contributes
    Subject,
    /// Only members with these keys
    Members(HashSet<MemberKey>),
}

impl Scope {
    fn admits(&self, value: &ExpressionValue) -> bool {
        match self {
            Self::Subject => true,
            Self::Members(keys) => keys.contains(&value.member_key()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RowKey {
    subject: String,
    input: Option<MemberKey>,
}

/// One stratifier dimension: the stratifier itself or one of its components
struct Dimension<'a> {
    component_id: Option<&'a str>,
    code: Option<&'a ConceptDef>,
    results: &'a IndexMap<String, StratifierResult>,
}

/// Rows sharing one tuple of component values
#[derive(Default)]
struct StratumRows {
    values: Vec<(usize, ExpressionValue)>,
    rows: Vec<RowKey>,
}

pub struct Stratifier;

impl Stratifier {
    /// Compute the strata of every stratifier of every group
    pub fn stratify_measure(measure: &mut MeasureDef) {
        for group in measure.groups_mut() {
            Self::stratify_group(group);
        }
    }

    pub fn stratify_group(group: &mut GroupDef) {
        let group_id = group.id().to_string();
        let strata: Vec<Vec<StratumDef>> = group
            .stratifiers()
            .iter()
            .map(|stratifier| Self::stratify(group, stratifier))
            .collect();
        for (stratifier, strata) in group.stratifiers_mut().iter_mut().zip(strata) {
            log::debug!(
                "Stratifier '{}' of group '{}' produced {} strata",
                stratifier.id(),
                group_id,
                strata.len()
            );
            stratifier.set_strata(strata);
        }
    }

    fn stratify(group: &GroupDef, stratifier: &StratifierDef) -> Vec<StratumDef> {
        match stratifier.kind() {
            StratifierKind::Criteria => vec![Self::criteria_stratum(group, stratifier)],
            StratifierKind::Value | StratifierKind::NonSubjectValue => {
                Self::value_strata(group, stratifier)
            }
        }
    }

    fn criteria_stratum(group: &GroupDef, stratifier: &StratifierDef) -> StratumDef {
        let boolean_basis = group.is_boolean_basis();
        let mut membership: IndexMap<String, Scope> = IndexMap::new();
        for (subject, result) in stratifier.results() {
            let StratifierResult::Subject(result) = result else {
                continue;
            };
            if boolean_basis {
                if result.value.is_truthy() {
                    membership.insert(subject.clone(), Scope::Subject);
                }
            } else {
                let keys: HashSet<MemberKey> = result.members().map(MemberKey::of).collect();
                if !keys.is_empty() {
                    membership.insert(subject.clone(), Scope::Members(keys));
                }
            }
        }

        let text = stratifier
            .code()
            .and_then(ConceptDef::display_text)
            .or(stratifier.expression())
            .unwrap_or(stratifier.id())
            .to_string();
        StratumDef::new(text, SmallVec::new(), Self::slices(group, &membership))
    }

    fn value_strata(group: &GroupDef, stratifier: &StratifierDef) -> Vec<StratumDef> {
        let dimensions: Vec<Dimension<'_>> = if stratifier.is_component() {
            stratifier
                .components()
                .iter()
                .map(|component| Dimension {
                    component_id: Some(component.id()),
                    code: component.code(),
                    results: component.results(),
                })
                .collect()
        } else {
            vec![Dimension {
                component_id: None,
                code: stratifier.code(),
                results: stratifier.results(),
            }]
        };

        let mut table: IndexMap<RowKey, Vec<(usize, ExpressionValue)>> = IndexMap::new();
        for (index, dimension) in dimensions.iter().enumerate() {
            for (subject, result) in dimension.results {
                match result {
                    StratifierResult::Subject(result) => {
                        table
                            .entry(RowKey {
                                subject: subject.clone(),
                                input: None,
                            })
                            .or_default()
                            .push((index, result.value.clone()));
                    }
                    StratifierResult::PerInput { values, .. } => {
                        for (input, value) in values.iter() {
                            if value.is_null() {
                                continue;
                            }
                            table
                                .entry(RowKey {
                                    subject: subject.clone(),
                                    input: Some(input.member_key()),
                                })
                                .or_default()
                                .push((index, value.clone()));
                        }
                    }
                }
            }
        }

        let mut grouped: IndexMap<Vec<(usize, MemberKey)>, StratumRows> = IndexMap::new();
        for (row, values) in table {
            let key: Vec<(usize, MemberKey)> = values
                .iter()
                .map(|(index, value)| (*index, value.member_key()))
                .collect();
            let entry = grouped.entry(key).or_default();
            if entry.rows.is_empty() {
                entry.values = values;
            }
            entry.rows.push(row);
        }

        grouped
            .into_values()
            .map(|stratum| {
                let values: SmallVec<[StratumValueDef; 2]> = stratum
                    .values
                    .iter()
                    .map(|(index, value)| StratumValueDef {
                        component_id: dimensions[*index].component_id.map(str::to_string),
                        code: dimensions[*index].code.cloned(),
                        value: value.clone(),
                    })
                    .collect();
                let text = stratum_text(stratifier.is_component(), &values);

                let mut membership: IndexMap<String, Scope> = IndexMap::new();
                for row in stratum.rows {
                    match row.input {
                        None => {
                            membership.insert(row.subject, Scope::Subject);
                        }
                        Some(input) => {
                            let scope = membership
                                .entry(row.subject)
                                .or_insert_with(|| Scope::Members(HashSet::new()));
                            if let Scope::Members(keys) = scope {
                                keys.insert(input);
                            }
                        }
                    }
                }
                StratumDef::new(text, values, Self::slices(group, &membership))
            })
            .collect()
    }

    fn slices(group: &GroupDef, membership: &IndexMap<String, Scope>) -> Vec<StratumPopulationDef> {
        group
            .populations()
            .iter()
            .map(|population| slice(population, membership))
            .collect()
    }
}

fn slice(population: &PopulationDef, membership: &IndexMap<String, Scope>) -> StratumPopulationDef {
    let mut subjects = Vec::new();
    let mut resources = MemberSet::new();
    let mut observations = Vec::new();
    let mut count = 0;

    for (subject, scope) in membership {
        if population.is_observation() {
            let Some(observed) = population.observations_for_subject(subject) else {
                continue;
            };
            let before = observations.len();
            observations.extend(
                observed
                    .iter()
                    .filter(|(input, _)| scope.admits(input))
                    .map(|(_, quantity)| quantity.clone()),
            );
            let matched = observations.len() - before;
            if matched > 0 {
                subjects.push(subject.clone());
                count += matched;
            }
        } else {
            let Some(members) = population.resources_for_subject(subject) else {
                continue;
            };
            let matched: Vec<&ExpressionValue> =
                members.iter().filter(|value| scope.admits(value)).collect();
            if matched.is_empty() {
                continue;
            }
            subjects.push(subject.clone());
            if population.is_boolean_basis() {
                count += 1;
            } else {
                count += matched.len();
                resources.extend(matched.into_iter().cloned());
            }
        }
    }

    StratumPopulationDef {
        population_id: population.id().to_string(),
        population_type: population.population_type(),
        subjects,
        resources,
        observations,
        count,
    }
}

/// Stratum label: the value's text; for components, the values joined when
/// all are primitive, else the first component's code text
fn stratum_text(is_component: bool, values: &[StratumValueDef]) -> String {
    if !is_component {
        return values
            .first()
            .map(|value| value.value.display_text())
            .unwrap_or_default();
    }
    if values.iter().all(|value| value.value.is_primitive()) {
        return values
            .iter()
            .map(|value| value.value.display_text())
            .collect::<Vec<_>>()
            .join(", ");
    }
    values
        .first()
        .and_then(|value| value.code.as_ref().and_then(ConceptDef::display_text).map(str::to_string))
        .or_else(|| values.first().map(|value| value.value.display_text()))
        .unwrap_or_default()
}
