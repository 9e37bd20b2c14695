//! Value model for clinical quality measure evaluation
//!
//! This crate holds the immutable descriptors shared by the measure engine:
//!
//! - **Population vocabulary**: population types, scoring types, population
//!   basis, improvement notation, aggregation methods, stratifier kinds
//! - **Clinical descriptors**: `CodeDef`, `ConceptDef`
//! - **Observations**: `QuantityDef`, compared by instance and never by value
//! - **Engine values**: `ExpressionValue` and `ResourceValue`, the shapes an
//!   expression engine hands back for a subject
//! - **Identity**: `MemberKey`, the domain-equality key used by every
//!   collection that accumulates subjects or resources
//! - **Subjects**: `SubjectRef` parsing of `Type/id` identifiers
//!
//! # Identity
//!
//! Two resources with the same type and logical id denote the same fact even
//! when they arrive as different instances with different content. Values
//! never hash by their Rust representation; they hash through `MemberKey`:
//!
//! ```
//! use octofhir_cqm_types::{ExpressionValue, MemberKey, ResourceValue};
//!
//! let a = ExpressionValue::Resource(ResourceValue::reference("Encounter", "123"));
//! let b = ExpressionValue::Resource(ResourceValue::reference("Encounter", "123"));
//! assert_eq!(MemberKey::of(&a), MemberKey::of(&b));
//! ```

pub mod code;
pub mod identity;
pub mod population;
pub mod quantity;
pub mod subject;
pub mod value;

pub use code::{CodeDef, ConceptDef};
pub use identity::MemberKey;
pub use population::{
    AggregateMethod, ImprovementNotation, MeasureEvalType, MeasurePopulationType,
    MeasureReportType, MeasureScoring, PopulationBasis, StratifierKind, UnknownCodeError,
};
pub use quantity::{ObservationId, QuantityDef};
pub use subject::{InvalidSubjectId, SubjectRef};
pub use value::{ExpressionValue, QuantityValue, ResourceValue};
