//! Proportion and ratio membership and scoring

mod common;

use common::*;
use octofhir_cqm_eval::types::{
    ExpressionValue, ImprovementNotation, MeasurePopulationType as P, MeasureScoring,
    PopulationBasis,
};
use octofhir_cqm_eval::{GroupDef, MeasureEvaluationOptions, PopulationDef, PrecomputedLibrary};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn subjects(n: usize) -> Vec<String> {
    (1..=n).map(patient).collect()
}

/// Patients 1-4 in the initial population and denominator; 1 and 2 in the
/// numerator; 4 excluded
fn exclusion_library() -> PrecomputedLibrary {
    let mut library = PrecomputedLibrary::new();
    for n in 1..=4 {
        library = library
            .with_result(patient(n), "Initial Population", true)
            .with_result(patient(n), "Denominator", true)
            .with_result(patient(n), "Numerator", n <= 2)
            .with_result(patient(n), "Denominator Exclusion", n == 4);
    }
    library
}

#[test]
fn test_boolean_proportion_with_exclusion() {
    let libraries = store(exclusion_library());
    let group = boolean_proportion_group(vec![population(
        "dex",
        P::DenominatorExclusion,
        "Denominator Exclusion",
    )]);
    let measure = run(&libraries, measure(MeasureScoring::Proportion, vec![group]), &subjects(4));

    let group = &measure.groups()[0];
    assert_eq!(count(group, P::InitialPopulation), 4);
    assert_eq!(count(group, P::Denominator), 4);
    assert_eq!(count(group, P::DenominatorExclusion), 1);
    assert_eq!(count(group, P::Numerator), 2);
    assert_eq!(count(group, P::TotalDenominator), 3);
    assert_eq!(count(group, P::TotalNumerator), 2);
    assert_close(group.score(), 2.0 / 3.0);
    assert!(measure.errors().is_empty());
}

#[test]
fn test_decrease_notation_inverts_score() {
    let libraries = store(exclusion_library());
    let group = boolean_proportion_group(vec![population(
        "dex",
        P::DenominatorExclusion,
        "Denominator Exclusion",
    )])
    .with_improvement_notation(ImprovementNotation::Decrease);
    let measure = run(&libraries, measure(MeasureScoring::Proportion, vec![group]), &subjects(4));

    assert_close(measure.groups()[0].score(), 1.0 / 3.0);
}

#[test]
fn test_exception_does_not_apply_to_numerator_members() {
    let mut library = PrecomputedLibrary::new();
    for n in 1..=3 {
        library = library
            .with_result(patient(n), "Initial Population", true)
            .with_result(patient(n), "Denominator", true)
            .with_result(patient(n), "Numerator", n == 1)
            .with_result(patient(n), "Denominator Exception", n != 2);
    }
    let libraries = store(library);
    let group = boolean_proportion_group(vec![population(
        "dexc",
        P::DenominatorException,
        "Denominator Exception",
    )]);
    let measure = run(&libraries, measure(MeasureScoring::Proportion, vec![group]), &subjects(3));

    let group = &measure.groups()[0];
    let numerator = group.population(P::Numerator).unwrap();
    let denominator = group.population(P::Denominator).unwrap();
    let exception = group.population(P::DenominatorException).unwrap();

    assert!(numerator.has_subject("Patient/1"));
    assert!(denominator.has_subject("Patient/1"));
    assert!(!exception.has_subject("Patient/1"));
    assert!(exception.has_subject("Patient/3"));
    // 1 / (3 - 0 - 1)
    assert_close(group.score(), 0.5);
}

#[test]
fn test_subject_outside_initial_population_counts_nowhere() {
    let library = PrecomputedLibrary::new()
        .with_result(patient(1), "Initial Population", false)
        .with_result(patient(1), "Denominator", true)
        .with_result(patient(1), "Numerator", true);
    let libraries = store(library);
    let measure = run(
        &libraries,
        measure(MeasureScoring::Proportion, vec![boolean_proportion_group(vec![])]),
        &subjects(1),
    );

    let group = &measure.groups()[0];
    assert!(group.populations().iter().all(|p| p.count() == 0));
    assert_eq!(group.score(), None);
}

#[test]
fn test_raw_membership_without_set_algebra() {
    let library = PrecomputedLibrary::new()
        .with_result(patient(1), "Initial Population", true)
        .with_result(patient(1), "Denominator", false)
        .with_result(patient(1), "Numerator", true);
    let libraries = store(library);
    let measure = run_with(
        &libraries,
        measure(MeasureScoring::Proportion, vec![boolean_proportion_group(vec![])]),
        &subjects(1),
        MeasureEvaluationOptions::default().with_apply_scoring_set_membership(false),
    );

    let group = &measure.groups()[0];
    assert_eq!(count(group, P::Numerator), 1);
    assert_eq!(count(group, P::Denominator), 0);
    assert_eq!(group.score(), None);
}

fn resource_group(extra: Vec<PopulationDef>) -> GroupDef {
    let mut populations = vec![
        population("ip", P::InitialPopulation, "Initial Population"),
        population("den", P::Denominator, "Denominator"),
        population("num", P::Numerator, "Numerator"),
    ];
    populations.extend(extra);
    GroupDef::new("encounters", encounter_basis(), populations)
}

#[test]
fn test_resource_exclusion_keeps_other_resources() {
    let library = PrecomputedLibrary::new()
        .with_result(patient(1), "Initial Population", encounters(&["e1", "e2", "e3"]))
        .with_result(patient(1), "Denominator", encounters(&["e1", "e2", "e3"]))
        .with_result(patient(1), "Numerator", encounters(&["e1", "e2"]))
        .with_result(patient(1), "Denominator Exclusion", encounters(&["e2"]))
        .with_result(patient(2), "Initial Population", encounters(&["e4"]))
        .with_result(patient(2), "Denominator", encounters(&["e4"]))
        .with_result(patient(2), "Numerator", encounters(&["e4"]))
        .with_result(patient(2), "Denominator Exclusion", ExpressionValue::list([]));
    let libraries = store(library);
    let group = resource_group(vec![population(
        "dex",
        P::DenominatorExclusion,
        "Denominator Exclusion",
    )]);
    let measure = run(&libraries, measure(MeasureScoring::Proportion, vec![group]), &subjects(2));

    let group = &measure.groups()[0];
    let denominator = group.population(P::Denominator).unwrap();
    let first = denominator.resources_for_subject("Patient/1").unwrap();
    assert!(first.contains(&encounter("e1")));
    assert!(first.contains(&encounter("e3")));

    let numerator = group.population(P::Numerator).unwrap();
    let first = numerator.resources_for_subject("Patient/1").unwrap();
    assert!(first.contains(&encounter("e1")));
    assert!(!first.contains(&encounter("e2")));

    assert_eq!(count(group, P::Denominator), 4);
    assert_eq!(count(group, P::DenominatorExclusion), 1);
    assert_eq!(count(group, P::Numerator), 2);
    // (2 - 0) / (4 - 1 - 0)
    assert_close(group.score(), 2.0 / 3.0);
}

#[test]
fn test_shared_resource_counts_per_subject() {
    let mut library = PrecomputedLibrary::new();
    for n in 1..=2 {
        library = library
            .with_result(patient(n), "Initial Population", encounters(&["shared"]))
            .with_result(patient(n), "Denominator", encounters(&["shared"]))
            .with_result(patient(n), "Numerator", ExpressionValue::Null);
    }
    let libraries = store(library);
    let measure = run(
        &libraries,
        measure(MeasureScoring::Proportion, vec![resource_group(vec![])]),
        &subjects(2),
    );

    let group = &measure.groups()[0];
    assert_eq!(count(group, P::Denominator), 2);
    assert_eq!(group.population(P::Denominator).unwrap().resources().len(), 1);
    assert_close(group.score(), 0.0);
}

#[test]
fn test_basis_mismatch_is_recorded_per_subject() {
    let library = PrecomputedLibrary::new()
        .with_result(patient(1), "Initial Population", true)
        .with_result(patient(1), "Denominator", true)
        .with_result(patient(1), "Numerator", true)
        .with_result(patient(2), "Initial Population", true)
        .with_result(patient(2), "Denominator", encounters(&["e1"]))
        .with_result(patient(2), "Numerator", true);
    let libraries = store(library);
    let group = GroupDef::new(
        "group-1",
        PopulationBasis::Boolean,
        vec![
            population("ip", P::InitialPopulation, "Initial Population"),
            population("den", P::Denominator, "Denominator"),
            population("num", P::Numerator, "Numerator"),
        ],
    );
    let measure = run(&libraries, measure(MeasureScoring::Proportion, vec![group]), &subjects(2));

    assert_eq!(measure.errors().len(), 1);
    assert!(measure.errors()[0].starts_with("Exception for subjectId: Patient/2, Message: "));
    assert!(measure.errors()[0].contains("Denominator"));
    let group = &measure.groups()[0];
    assert_eq!(count(group, P::Denominator), 1);
    assert_close(group.score(), 1.0);
}


/// Per-patient criteria outcomes; `exclusion` is 0 for none, 1 for a
/// denominator exclusion and 2 for a denominator exception
#[derive(Debug, Clone)]
struct Outcome {
    initial: bool,
    denominator: bool,
    numerator: bool,
    numerator_exclusion: bool,
    exclusion: u8,
}

fn outcome() -> impl Strategy<Value = Outcome> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), 0u8..3).prop_map(
        |(initial, denominator, numerator, numerator_exclusion, exclusion)| Outcome {
            initial,
            denominator,
            numerator,
            numerator_exclusion,
            exclusion,
        },
    )
}

/// Counts the set algebra should produce, computed independently
fn expected_counts(outcomes: &[Outcome]) -> (usize, usize, usize, usize, usize) {
    let (mut n, mut nx, mut d, mut dx, mut dex) = (0, 0, 0, 0, 0);
    for o in outcomes {
        let in_denominator = o.initial && o.denominator;
        if !in_denominator {
            continue;
        }
        d += 1;
        let excluded = o.exclusion == 1;
        let in_numerator = o.numerator && !excluded;
        if excluded {
            dx += 1;
        }
        if in_numerator {
            n += 1;
            if o.numerator_exclusion {
                nx += 1;
            }
        }
        if o.exclusion == 2 && !in_numerator {
            dex += 1;
        }
    }
    (n, nx, d, dx, dex)
}

proptest! {
    #[test]
    fn prop_proportion_score_matches_formula(outcomes in prop::collection::vec(outcome(), 0..10)) {
        let mut library = PrecomputedLibrary::new();
        for (i, o) in outcomes.iter().enumerate() {
            let subject = patient(i + 1);
            library = library
                .with_result(subject.clone(), "Initial Population", o.initial)
                .with_result(subject.clone(), "Denominator", o.denominator)
                .with_result(subject.clone(), "Numerator", o.numerator)
                .with_result(subject.clone(), "Numerator Exclusion", o.numerator_exclusion)
                .with_result(subject.clone(), "Denominator Exclusion", o.exclusion == 1)
                .with_result(subject, "Denominator Exception", o.exclusion == 2);
        }
        let libraries = store(library);
        let group = boolean_proportion_group(vec![
            population("nx", P::NumeratorExclusion, "Numerator Exclusion"),
            population("dx", P::DenominatorExclusion, "Denominator Exclusion"),
            population("dex", P::DenominatorException, "Denominator Exception"),
        ]);
        let measure = run(
            &libraries,
            measure(MeasureScoring::Proportion, vec![group]),
            &subjects(outcomes.len()),
        );
        let group = &measure.groups()[0];

        let (n, nx, d, dx, dex) = expected_counts(&outcomes);
        prop_assert_eq!(count(group, P::Numerator), n);
        prop_assert_eq!(count(group, P::NumeratorExclusion), nx);
        prop_assert_eq!(count(group, P::Denominator), d);
        prop_assert_eq!(count(group, P::DenominatorExclusion), dx);
        prop_assert_eq!(count(group, P::DenominatorException), dex);
        prop_assert!(n <= d);

        let numerator = group.population(P::Numerator).unwrap();
        let denominator = group.population(P::Denominator).unwrap();
        prop_assert!(numerator.subjects().all(|s| denominator.has_subject(s)));

        let divisor = d - dx - dex;
        let expected = if divisor == 0 {
            None
        } else {
            Some((n - nx) as f64 / divisor as f64)
        };
        prop_assert_eq!(group.score(), expected);
        if let Some(score) = group.score() {
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
