//! Batch evaluation of measures over a list of subjects
//!
//! Expression evaluation runs first, subject by subject, optionally on a
//! rayon pool where every worker owns one engine session. The per-subject
//! results are then applied to the measures by the calling thread in
//! subject order, so accumulators are never shared between threads. Once
//! every subject has been applied, each measure is stratified and scored.
//!
//! A configuration error aborts only the measure that raised it: its later
//! subjects are skipped and it is never stratified or scored, while the
//! other measures of the batch run to completion.

use futures::future::join_all;
use octofhir_cqm_types::SubjectRef;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::def::MeasureDef;
use crate::engine::{EngineFactory, ExpressionEngine, LibraryIdentifier, LibraryResolver, resolve_libraries};
use crate::error::{MeasureError, MeasureResult};
use crate::evaluator::MeasureEvaluator;
use crate::function::FunctionEvaluator;
use crate::options::MeasureEvaluationOptions;
use crate::result::EvaluationResult;
use crate::scorer::MeasureDefScorer;
use crate::stratification::Stratifier;

/// Everything evaluated for one subject
#[derive(Debug, Clone)]
pub struct SubjectEvaluation {
    pub subject: SubjectRef,
    /// One outcome per measure, in the order the measures were given.
    /// An aborted measure reports its abort error for every subject.
    pub results: Vec<MeasureResult<EvaluationResult>>,
}

impl SubjectEvaluation {
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }
}

/// Result of one batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub evaluations: Vec<SubjectEvaluation>,
    /// Aborted measures as (index into the batch, error)
    pub failures: Vec<(usize, MeasureError)>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, measure_index: usize) -> Option<&MeasureError> {
        self.failures
            .iter()
            .find(|(index, _)| *index == measure_index)
            .map(|(_, err)| err)
    }

    /// The evaluations, or the first measure failure
    pub fn into_result(self) -> MeasureResult<Vec<SubjectEvaluation>> {
        match self.failures.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(self.evaluations),
        }
    }
}

pub struct BatchEvaluator {
    factory: Arc<dyn EngineFactory>,
    options: MeasureEvaluationOptions,
}

impl BatchEvaluator {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            options: MeasureEvaluationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MeasureEvaluationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MeasureEvaluationOptions {
        &self.options
    }

    /// Evaluate, stratify and score `measures` for every subject.
    ///
    /// Every measure is completed even when another one aborts; the first
    /// abort is returned.
    pub fn evaluate<S: AsRef<str>>(
        &self,
        measures: &mut [MeasureDef],
        subject_ids: &[S],
    ) -> MeasureResult<()> {
        self.evaluate_results(measures, subject_ids)?
            .into_result()
            .map(|_| ())
    }

    /// Like [`evaluate`](Self::evaluate), also returning the per-subject
    /// expression results and every aborted measure. Only a malformed
    /// subject id or a worker pool failure fails the whole batch.
    pub fn evaluate_results<S: AsRef<str>>(
        &self,
        measures: &mut [MeasureDef],
        subject_ids: &[S],
    ) -> MeasureResult<BatchOutcome> {
        let aborted = vec![None; measures.len()];
        self.run(measures, subject_ids, aborted)
    }

    /// Resolve the library of every measure, then evaluate. A measure whose
    /// library cannot be resolved is aborted with the resolution error.
    pub async fn evaluate_resolved<R, S>(
        &self,
        resolver: &R,
        measures: &mut [MeasureDef],
        subject_ids: &[S],
    ) -> MeasureResult<BatchOutcome>
    where
        R: LibraryResolver + ?Sized,
        S: AsRef<str>,
    {
        let libraries: Vec<LibraryIdentifier> = measures
            .iter()
            .map(|measure| measure.library().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let outcomes = join_all(
            libraries
                .iter()
                .map(|library| resolve_libraries(resolver, std::slice::from_ref(library))),
        )
        .await;
        let unresolved: HashMap<&LibraryIdentifier, MeasureError> = libraries
            .iter()
            .zip(outcomes)
            .filter_map(|(library, outcome)| outcome.err().map(|err| (library, err)))
            .collect();

        let aborted = measures
            .iter()
            .map(|measure| unresolved.get(measure.library()).cloned())
            .collect();
        self.run(measures, subject_ids, aborted)
    }

    fn run<S: AsRef<str>>(
        &self,
        measures: &mut [MeasureDef],
        subject_ids: &[S],
        mut aborted: Vec<Option<MeasureError>>,
    ) -> MeasureResult<BatchOutcome> {
        let subjects = subject_ids
            .iter()
            .map(|id| SubjectRef::parse(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        self.validate_expression_kinds(measures, &mut aborted);

        let evaluations = self.evaluate_expressions(measures, &aborted, &subjects)?;

        let evaluator = MeasureEvaluator::new(&self.options);
        for evaluation in &evaluations {
            for ((measure, outcome), slot) in measures
                .iter_mut()
                .zip(&evaluation.results)
                .zip(aborted.iter_mut())
            {
                if slot.is_some() {
                    continue;
                }
                let applied = match outcome {
                    Ok(results) => evaluator.evaluate_subject(measure, &evaluation.subject, results),
                    Err(err) => Err(err.clone()),
                };
                if let Err(err) = applied {
                    if err.is_fatal() {
                        abort(measure, slot, err);
                        continue;
                    }
                    let message = format!(
                        "Exception for subjectId: {}, Message: {}",
                        evaluation.subject, err
                    );
                    log::error!("{}", message);
                    measure.add_error(message);
                }
            }
        }

        for (measure, slot) in measures.iter_mut().zip(aborted.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            Stratifier::stratify_measure(measure);
            if let Err(err) = MeasureDefScorer::score(measure) {
                abort(measure, slot, err);
            }
        }

        let failures = aborted
            .into_iter()
            .enumerate()
            .filter_map(|(index, err)| err.map(|err| (index, err)))
            .collect();
        Ok(BatchOutcome {
            evaluations,
            failures,
        })
    }

    fn validate_expression_kinds(
        &self,
        measures: &[MeasureDef],
        aborted: &mut [Option<MeasureError>],
    ) {
        let mut engine = self.factory.create_engine();
        for (measure, slot) in measures.iter().zip(aborted.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            let functions = FunctionEvaluator::new(engine.as_mut(), measure.library());
            let checked = measure.groups().iter().try_for_each(|group| {
                functions.validate_stratifier_expression_kinds(group)?;
                functions.validate_observation_expression_kinds(group)
            });
            if let Err(err) = checked {
                abort(measure, slot, err);
            }
        }
    }

    fn evaluate_expressions(
        &self,
        measures: &[MeasureDef],
        aborted: &[Option<MeasureError>],
        subjects: &[SubjectRef],
    ) -> MeasureResult<Vec<SubjectEvaluation>> {
        let evaluator = MeasureEvaluator::new(&self.options);

        if self.options.parallelism <= 1 || subjects.len() <= 1 {
            let mut engine = self.factory.create_engine();
            return Ok(subjects
                .iter()
                .map(|subject| evaluate_subject(&evaluator, engine.as_mut(), measures, aborted, subject))
                .collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.parallelism)
            .build()
            .map_err(|err| MeasureError::internal(format!("Unable to start evaluation workers: {}", err)))?;
        log::debug!(
            "Evaluating {} subjects on {} workers",
            subjects.len(),
            self.options.parallelism
        );
        Ok(pool.install(|| {
            subjects
                .par_iter()
                .map_init(
                    || self.factory.create_engine(),
                    |engine, subject| evaluate_subject(&evaluator, engine.as_mut(), measures, aborted, subject),
                )
                .collect()
        }))
    }
}

fn abort(measure: &MeasureDef, slot: &mut Option<MeasureError>, err: MeasureError) {
    log::error!("Evaluation of measure {} aborted: {}", measure.url(), err);
    *slot = Some(err);
}

fn evaluate_subject(
    evaluator: &MeasureEvaluator<'_>,
    engine: &mut dyn ExpressionEngine,
    measures: &[MeasureDef],
    aborted: &[Option<MeasureError>],
    subject: &SubjectRef,
) -> SubjectEvaluation {
    let session = engine.set_subject(subject).map_err(MeasureError::from_engine);
    let results = measures
        .iter()
        .zip(aborted)
        .map(|(measure, aborted)| match (aborted, &session) {
            (Some(err), _) | (None, Err(err)) => Err(err.clone()),
            (None, Ok(())) => evaluator.evaluate_expressions(&mut *engine, measure, subject),
        })
        .collect();
    SubjectEvaluation {
        subject: subject.clone(),
        results,
    }
}
