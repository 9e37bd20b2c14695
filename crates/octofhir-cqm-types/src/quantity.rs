//! Continuous-variable observations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBSERVATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationId(u64);

impl ObservationId {
    pub fn next() -> Self {
        Self(NEXT_OBSERVATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observation-{}", self.0)
    }
}

/// One numeric observation produced by a measure-observation function.
///
/// Two `QuantityDef`s holding the same number are different observations:
/// there is no `PartialEq`, and identity goes through
/// [`QuantityDef::id`]. Cloning keeps the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityDef {
    #[serde(skip, default = "ObservationId::next")]
    id: ObservationId,
    value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
}

impl QuantityDef {
    pub fn new(value: f64) -> Self {
        Self {
            id: ObservationId::next(),
            value,
            unit: None,
        }
    }

    pub fn with_unit(value: f64, unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            ..Self::new(value)
        }
    }

    pub fn id(&self) -> ObservationId {
        self.id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn is_same_observation(&self, other: &QuantityDef) -> bool {
        self.id == other.id
    }
}
