//! Domain-equality keys
//!
//! Every set or map built over engine values keys on `MemberKey` instead of
//! the value itself:
//!
//! - resources are the same member when type and logical id match, whatever
//!   their content (resources without an id fall back to their content)
//! - integers and decimals compare numerically (`1 = 1.0`)
//! - codes compare on system and code; concepts on their set of codes
//! - lists and tuples compare structurally
//! - observations (`QuantityDef`) compare by instance only

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::fmt;

use crate::quantity::{ObservationId, QuantityDef};
use crate::value::{ExpressionValue, ResourceValue};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKey {
    Null,
    Boolean(bool),
    Number(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Quantity {
        value: Decimal,
        unit: Option<String>,
    },
    Code {
        system: Option<String>,
        code: String,
    },
    Concept(Vec<MemberKey>),
    ConceptText(String),
    List(Vec<MemberKey>),
    Tuple(Vec<(String, MemberKey)>),
    Resource {
        resource_type: String,
        id: String,
    },
    ResourceContent {
        resource_type: String,
        content: String,
    },
    Observation(ObservationId),
}

impl MemberKey {
    pub fn of(value: &ExpressionValue) -> Self {
        match value {
            ExpressionValue::Null => Self::Null,
            ExpressionValue::Boolean(b) => Self::Boolean(*b),
            ExpressionValue::Integer(i) => Self::Number(Decimal::from(*i).normalize()),
            ExpressionValue::Decimal(d) => Self::Number(d.normalize()),
            ExpressionValue::String(s) => Self::String(s.clone()),
            ExpressionValue::Date(d) => Self::Date(*d),
            ExpressionValue::DateTime(dt) => Self::DateTime(dt.with_timezone(&Utc)),
            ExpressionValue::Quantity(q) => Self::Quantity {
                value: q.value.normalize(),
                unit: q.unit.clone(),
            },
            ExpressionValue::Code(code) => Self::Code {
                system: code.system.clone(),
                code: code.code.clone(),
            },
            ExpressionValue::Concept(concept) => {
                if concept.codings.is_empty() {
                    return Self::ConceptText(concept.text.clone().unwrap_or_default());
                }
                let mut codes: Vec<MemberKey> = concept
                    .codings
                    .iter()
                    .map(|code| Self::Code {
                        system: code.system.clone(),
                        code: code.code.clone(),
                    })
                    .collect();
                codes.sort();
                codes.dedup();
                Self::Concept(codes)
            }
            ExpressionValue::List(values) => Self::List(values.iter().map(Self::of).collect()),
            ExpressionValue::Tuple(elements) => {
                let mut keyed: Vec<(String, MemberKey)> = elements
                    .iter()
                    .map(|(name, value)| (name.clone(), Self::of(value)))
                    .collect();
                keyed.sort();
                Self::Tuple(keyed)
            }
            ExpressionValue::Resource(resource) => Self::of_resource(resource),
        }
    }

    pub fn of_resource(resource: &ResourceValue) -> Self {
        match &resource.id {
            Some(id) => Self::Resource {
                resource_type: resource.resource_type.clone(),
                id: id.clone(),
            },
            None => Self::ResourceContent {
                resource_type: resource.resource_type.clone(),
                content: resource.content.to_string(),
            },
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource { .. } | Self::ResourceContent { .. })
    }
}

impl From<&ExpressionValue> for MemberKey {
    fn from(value: &ExpressionValue) -> Self {
        Self::of(value)
    }
}

impl From<&QuantityDef> for MemberKey {
    fn from(quantity: &QuantityDef) -> Self {
        Self::Observation(quantity.id())
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Quantity { value, unit } => match unit {
                Some(unit) => write!(f, "{} '{}'", value, unit),
                None => write!(f, "{}", value),
            },
            Self::Code { system, code } => match system {
                Some(system) => write!(f, "{}|{}", system, code),
                None => f.write_str(code),
            },
            Self::Concept(codes) | Self::List(codes) => {
                f.write_str("[")?;
                for (i, code) in codes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", code)?;
                }
                f.write_str("]")
            }
            Self::ConceptText(text) => f.write_str(text),
            Self::Tuple(elements) => {
                f.write_str("{")?;
                for (i, (name, value)) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                f.write_str("}")
            }
            Self::Resource { resource_type, id } => write!(f, "{}/{}", resource_type, id),
            Self::ResourceContent { resource_type, .. } => write!(f, "{}/<anonymous>", resource_type),
            Self::Observation(id) => write!(f, "{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CodeDef, ConceptDef};
    use serde_json::json;

    #[test]
    fn test_resources_key_on_type_and_id() {
        let bare = ExpressionValue::resource("Encounter", "123");
        let full = ExpressionValue::Resource(
            ResourceValue::from_json(json!({
                "resourceType": "Encounter",
                "id": "123",
                "status": "finished"
            }))
            .unwrap(),
        );
        assert_eq!(MemberKey::of(&bare), MemberKey::of(&full));
        assert_ne!(
            MemberKey::of(&bare),
            MemberKey::of(&ExpressionValue::resource("Observation", "123"))
        );
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(
            MemberKey::of(&ExpressionValue::Integer(1)),
            MemberKey::of(&ExpressionValue::Decimal(Decimal::new(100, 2)))
        );
    }

    #[test]
    fn test_concept_codes_are_unordered() {
        let a = ConceptDef::new(vec![CodeDef::new("s", "1"), CodeDef::new("s", "2")]);
        let b = ConceptDef::new(vec![CodeDef::new("s", "2"), CodeDef::new("s", "1")])
            .with_text("different text");
        assert_eq!(
            MemberKey::of(&ExpressionValue::Concept(a)),
            MemberKey::of(&ExpressionValue::Concept(b))
        );
    }

    #[test]
    fn test_observations_key_on_instance() {
        let a = QuantityDef::new(4.0);
        let b = QuantityDef::new(4.0);
        assert_ne!(MemberKey::from(&a), MemberKey::from(&b));
        assert_eq!(MemberKey::from(&a), MemberKey::from(&a.clone()));
    }
}
