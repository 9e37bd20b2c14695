//! Coded vocabularies of measure evaluation
//!
//! Every enum here round-trips through its canonical code (`numerator-exclusion`,
//! `continuous-variable`, ...) for `Display`, `FromStr` and serde.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A code that does not belong to the vocabulary it was parsed against
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} code: '{code}'")]
pub struct UnknownCodeError {
    pub kind: &'static str,
    pub code: String,
}

impl UnknownCodeError {
    pub fn new(kind: &'static str, code: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
        }
    }
}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl $name {
            /// Every member of the vocabulary, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical code
            pub fn code(&self) -> &'static str {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Parse a canonical code
            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }

        impl FromStr for $name {
            type Err = UnknownCodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_code(s).ok_or_else(|| UnknownCodeError::new($kind, s))
            }
        }
    };
}

coded_enum! {
    /// Population a criteria expression contributes to
    MeasurePopulationType ("population type") {
        InitialPopulation => "initial-population",
        Numerator => "numerator",
        NumeratorExclusion => "numerator-exclusion",
        Denominator => "denominator",
        DenominatorExclusion => "denominator-exclusion",
        DenominatorException => "denominator-exception",
        MeasurePopulation => "measure-population",
        MeasurePopulationExclusion => "measure-population-exclusion",
        MeasureObservation => "measure-observation",
        /// Survivors of the numerator algebra, kept for aggregate reporting
        TotalNumerator => "total-numerator",
        /// Survivors of the denominator algebra, kept for aggregate reporting
        TotalDenominator => "total-denominator",
    }
}

impl MeasurePopulationType {
    /// Human readable name
    pub fn display(&self) -> &'static str {
        match self {
            Self::InitialPopulation => "Initial Population",
            Self::Numerator => "Numerator",
            Self::NumeratorExclusion => "Numerator Exclusion",
            Self::Denominator => "Denominator",
            Self::DenominatorExclusion => "Denominator Exclusion",
            Self::DenominatorException => "Denominator Exception",
            Self::MeasurePopulation => "Measure Population",
            Self::MeasurePopulationExclusion => "Measure Population Exclusion",
            Self::MeasureObservation => "Measure Observation",
            Self::TotalNumerator => "Total Numerator",
            Self::TotalDenominator => "Total Denominator",
        }
    }

    /// Total populations are derived by the engine and carry no expression
    pub fn is_total(&self) -> bool {
        matches!(self, Self::TotalNumerator | Self::TotalDenominator)
    }
}

coded_enum! {
    /// Scoring algorithm of a group
    MeasureScoring ("measure scoring") {
        Proportion => "proportion",
        Ratio => "ratio",
        ContinuousVariable => "continuous-variable",
        Cohort => "cohort",
    }
}

coded_enum! {
    /// Direction in which a score improves
    ImprovementNotation ("improvement notation") {
        Increase => "increase",
        Decrease => "decrease",
    }
}

impl Default for ImprovementNotation {
    fn default() -> Self {
        Self::Increase
    }
}

coded_enum! {
    /// Aggregation applied to continuous-variable observations
    AggregateMethod ("aggregate method") {
        Sum => "sum",
        Average => "average",
        Min => "min",
        Max => "max",
        Median => "median",
        Count => "count",
        /// The library did not declare a method
        NotApplicable => "N/A",
    }
}

coded_enum! {
    /// How a stratifier partitions the group
    StratifierKind ("stratifier kind") {
        /// The stratifier result already matches population members
        Criteria => "criteria",
        /// One scalar value per subject
        Value => "value",
        /// A function evaluated once per population resource
        NonSubjectValue => "non-subject-value",
    }
}

coded_enum! {
    /// Requested evaluation scope
    MeasureEvalType ("evaluation type") {
        Subject => "subject",
        SubjectList => "subject-list",
        Population => "population",
    }
}

impl MeasureEvalType {
    pub fn report_type(&self) -> MeasureReportType {
        match self {
            Self::Subject => MeasureReportType::Individual,
            Self::SubjectList => MeasureReportType::SubjectList,
            Self::Population => MeasureReportType::Summary,
        }
    }
}

impl Default for MeasureEvalType {
    fn default() -> Self {
        Self::Population
    }
}

coded_enum! {
    /// Shape of the report the scored definition is rendered into
    MeasureReportType ("report type") {
        Individual => "individual",
        SubjectList => "subject-list",
        Summary => "summary",
    }
}

/// Whether membership is tracked per subject or per resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PopulationBasis {
    #[default]
    Boolean,
    /// Resource type name, e.g. `Encounter`
    Resource(String),
}

impl PopulationBasis {
    pub fn from_code(code: &str) -> Self {
        if code.eq_ignore_ascii_case("boolean") {
            Self::Boolean
        } else {
            Self::Resource(code.to_string())
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Boolean => "boolean",
            Self::Resource(resource_type) => resource_type,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean)
    }

    pub fn resource_type(&self) -> Option<&str> {
        match self {
            Self::Boolean => None,
            Self::Resource(resource_type) => Some(resource_type),
        }
    }
}

impl From<String> for PopulationBasis {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<PopulationBasis> for String {
    fn from(basis: PopulationBasis) -> Self {
        basis.code().to_string()
    }
}

impl fmt::Display for PopulationBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
