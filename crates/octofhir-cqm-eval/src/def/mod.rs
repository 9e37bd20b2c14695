//! The measure definition tree
//!
//! `MeasureDef` → `GroupDef` → `PopulationDef` / `StratifierDef` → `StratumDef`.
//! The tree is built once from static measure content, filled subject by
//! subject, stratified and scored, then handed to a report renderer.

pub mod group;
pub mod measure;
pub mod population;
pub mod scoring;
pub mod sde;
pub mod stratifier;
pub mod stratum;

pub use group::GroupDef;
pub use measure::{MeasureDef, MeasurementPeriod};
pub use population::PopulationDef;
pub use scoring::{
    ContinuousVariablePopulations, ProportionPopulations, RatioObservations, ScoringPopulations,
};
pub use sde::SdeDef;
pub use stratifier::{StratifierComponentDef, StratifierDef, StratifierResult};
pub use stratum::{StratumDef, StratumPopulationDef, StratumValueDef};
