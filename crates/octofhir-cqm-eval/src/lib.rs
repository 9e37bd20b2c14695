//! Clinical Quality Measure Evaluation Engine
//!
//! This crate turns per-subject expression results into measure results:
//! population membership, scores and strata. It never evaluates logic
//! itself; an [`ExpressionEngine`] supplies the value of every population,
//! stratifier and supplemental-data expression for each subject.
//!
//! - **Populations**: initial population, denominator, numerator, their
//!   exclusions and exceptions, measure population, measure observations,
//!   and the engine-derived totals
//! - **Scoring**: proportion, ratio (with or without observations),
//!   continuous variable, cohort
//! - **Stratification**: criteria, value, component and non-subject-value
//!   stratifiers, each stratum carrying its own population slices and score
//! - **Basis**: boolean (subjects are counted) or resource (resources are
//!   counted, identified by type and logical id)
//!
//! # Example
//!
//! ```ignore
//! use octofhir_cqm_eval::{BatchEvaluator, PrecomputedLibraries};
//! use std::sync::Arc;
//!
//! let libraries = PrecomputedLibraries::new();
//! // libraries.add_library("Lib", ...);
//! let evaluator = BatchEvaluator::new(Arc::new(libraries));
//! evaluator.evaluate(&mut measures, &["Patient/1", "Patient/2"])?;
//! let score = measures[0].groups()[0].score();
//! ```
//!
//! # Architecture
//!
//! - `def`: the measure definition tree and its accumulators
//! - `evaluator`: per-subject population membership and set algebra
//! - `function`: measure observation and non-subject stratifier functions
//! - `stratification`: partitioning of populations into strata
//! - `scorer` / `score`: group and stratum scores
//! - `orchestrator`: batch evaluation, optionally across worker threads
//!
//! # Errors
//!
//! A failure while evaluating one subject is recorded on the measure and the
//! batch continues. A configuration error aborts the measure that raised it
//! while the rest of the batch is still scored; see [`MeasureError::is_fatal`]
//! and [`BatchOutcome`].

pub mod basis;
pub mod collections;
pub mod def;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod function;
pub mod options;
pub mod orchestrator;
pub mod precomputed;
pub mod result;
pub mod score;
pub mod scorer;
pub mod stratification;

// Re-export main types
pub use basis::PopulationBasisValidator;
pub use collections::{MemberMap, MemberSet};
pub use def::{
    ContinuousVariablePopulations, GroupDef, MeasureDef, MeasurementPeriod, PopulationDef,
    ProportionPopulations, RatioObservations, ScoringPopulations, SdeDef, StratifierComponentDef,
    StratifierDef, StratifierResult, StratumDef, StratumPopulationDef, StratumValueDef,
};
pub use engine::{
    CachingLibraryResolver, EngineFactory, ExpressionEngine, ExpressionKind, LibraryIdentifier,
    LibraryResolver, resolve_libraries,
};
pub use error::{EngineError, MeasureError, MeasureResult};
pub use evaluator::MeasureEvaluator;
pub use function::FunctionEvaluator;
pub use options::MeasureEvaluationOptions;
pub use orchestrator::{BatchEvaluator, BatchOutcome, SubjectEvaluation};
pub use precomputed::{PrecomputedEngine, PrecomputedLibraries, PrecomputedLibrary};
pub use result::{CriteriaResult, EvaluationResult, FunctionResult};
pub use scorer::MeasureDefScorer;
pub use stratification::Stratifier;

pub use octofhir_cqm_types as types;
