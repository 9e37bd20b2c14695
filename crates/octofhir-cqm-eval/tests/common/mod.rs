//! Common test utilities for measure evaluation
//!
//! Builds measures over a single precomputed library and runs them through
//! the batch evaluator.

#![allow(dead_code)]

use octofhir_cqm_eval::types::{
    ExpressionValue, MeasurePopulationType, MeasureScoring, PopulationBasis,
};
use octofhir_cqm_eval::{
    BatchEvaluator, GroupDef, LibraryIdentifier, MeasureDef, MeasureEvaluationOptions,
    PopulationDef, PrecomputedLibraries, PrecomputedLibrary,
};
use std::sync::Arc;

pub const LIBRARY: &str = "MeasureLib";
pub const MEASURE_URL: &str = "http://example.org/fhir/Measure/test";

pub fn library() -> LibraryIdentifier {
    LibraryIdentifier::versioned(LIBRARY, "1.0.0")
}

pub fn patient(n: usize) -> String {
    format!("Patient/{n}")
}

pub fn encounter(id: &str) -> ExpressionValue {
    ExpressionValue::resource("Encounter", id)
}

pub fn encounters(ids: &[&str]) -> ExpressionValue {
    ExpressionValue::list(ids.iter().map(|id| encounter(id)))
}

pub fn population(id: &str, population_type: MeasurePopulationType, expression: &str) -> PopulationDef {
    PopulationDef::new(id, population_type, expression)
}

pub fn measure(scoring: MeasureScoring, groups: Vec<GroupDef>) -> MeasureDef {
    MeasureDef::new("test", MEASURE_URL, library(), Some(scoring), groups)
        .expect("valid measure")
}

/// IP, denominator and numerator on a boolean basis, plus `extra`
pub fn boolean_proportion_group(extra: Vec<PopulationDef>) -> GroupDef {
    let mut populations = vec![
        population("ip", MeasurePopulationType::InitialPopulation, "Initial Population"),
        population("den", MeasurePopulationType::Denominator, "Denominator"),
        population("num", MeasurePopulationType::Numerator, "Numerator"),
    ];
    populations.extend(extra);
    GroupDef::new("group-1", PopulationBasis::Boolean, populations)
}

pub fn encounter_basis() -> PopulationBasis {
    PopulationBasis::Resource("Encounter".to_string())
}

pub fn store(library: PrecomputedLibrary) -> PrecomputedLibraries {
    let libraries = PrecomputedLibraries::new();
    libraries.add_library(LIBRARY, library);
    libraries
}

/// Evaluate one measure sequentially and hand it back
pub fn run(libraries: &PrecomputedLibraries, measure: MeasureDef, subjects: &[String]) -> MeasureDef {
    run_with(libraries, measure, subjects, MeasureEvaluationOptions::default())
}

pub fn run_with(
    libraries: &PrecomputedLibraries,
    measure: MeasureDef,
    subjects: &[String],
    options: MeasureEvaluationOptions,
) -> MeasureDef {
    let mut measures = vec![measure];
    BatchEvaluator::new(Arc::new(libraries.clone()))
        .with_options(options)
        .evaluate(&mut measures, subjects)
        .expect("evaluation succeeds");
    measures.remove(0)
}

pub fn count(group: &GroupDef, population_type: MeasurePopulationType) -> usize {
    group
        .population(population_type)
        .map_or(0, PopulationDef::count)
}

pub fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("a score");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
