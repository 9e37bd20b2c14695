//! Values handed back by the expression engine
//!
//! `ExpressionValue` is not `PartialEq`/`Hash`: equality between
//! engine values is domain equality and goes through [`MemberKey`].

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::code::{CodeDef, ConceptDef};
use crate::identity::MemberKey;

/// Runtime value of a named expression or function call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ExpressionValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Quantity(QuantityValue),
    Code(CodeDef),
    Concept(ConceptDef),
    List(Vec<ExpressionValue>),
    Tuple(IndexMap<String, ExpressionValue>),
    Resource(ResourceValue),
}

/// Quantity as produced by the engine (value plus unit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityValue {
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A resource instance, identified by its concrete type and logical id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceValue {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub content: serde_json::Value,
}

impl ResourceValue {
    /// A content-less resource standing for `resource_type/id`
    pub fn reference(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            content: serde_json::Value::Null,
        }
    }

    /// Read `resourceType` and `id` from a JSON resource
    pub fn from_json(content: serde_json::Value) -> Option<Self> {
        let resource_type = content.get("resourceType")?.as_str()?.to_string();
        let id = content
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        Some(Self {
            resource_type,
            id,
            content,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// `Type/id`, when the resource has a logical id
    pub fn qualified_id(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("{}/{}", self.resource_type, id))
    }
}

impl ExpressionValue {
    pub fn integer(value: i64) -> Self {
        Self::Integer(value)
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::Decimal(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn resource(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Resource(ResourceValue::reference(resource_type, id))
    }

    pub fn list(values: impl IntoIterator<Item = ExpressionValue>) -> Self {
        Self::List(values.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Only `Boolean(true)` is truthy; null and false are not
    pub fn is_truthy(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    pub fn as_resource(&self) -> Option<&ResourceValue> {
        match self {
            Self::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ExpressionValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Numeric view used by observation conversion
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Decimal(d) => d.to_f64(),
            Self::Quantity(q) => q.value.to_f64(),
            _ => None,
        }
    }

    /// Members of a criteria result: list elements, nothing for null,
    /// the value itself otherwise
    pub fn iter_members(&self) -> std::slice::Iter<'_, ExpressionValue> {
        match self {
            Self::Null => std::slice::Iter::default(),
            Self::List(values) => values.iter(),
            other => std::slice::from_ref(other).iter(),
        }
    }

    pub fn member_key(&self) -> MemberKey {
        MemberKey::of(self)
    }

    /// Type name used in diagnostics; resources report their concrete type
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Decimal(_) => "Decimal",
            Self::String(_) => "String",
            Self::Date(_) => "Date",
            Self::DateTime(_) => "DateTime",
            Self::Quantity(_) => "Quantity",
            Self::Code(_) => "Code",
            Self::Concept(_) => "Concept",
            Self::List(_) => "List",
            Self::Tuple(_) => "Tuple",
            Self::Resource(resource) => &resource.resource_type,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Boolean(_)
                | Self::Integer(_)
                | Self::Decimal(_)
                | Self::String(_)
                | Self::Date(_)
                | Self::DateTime(_)
        )
    }

    /// Values a subject-level stratifier may produce
    pub fn is_scalar(&self) -> bool {
        self.is_primitive()
            || matches!(
                self,
                Self::Code(_) | Self::Concept(_) | Self::Quantity(_) | Self::Resource(_)
            )
    }

    /// Text shown for a stratum value
    pub fn display_text(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) => d.normalize().to_string(),
            Self::String(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.to_rfc3339(),
            Self::Quantity(q) => match &q.unit {
                Some(unit) => format!("{} {}", q.value.normalize(), unit),
                None => q.value.normalize().to_string(),
            },
            Self::Code(code) => code.text().to_string(),
            Self::Concept(concept) => concept.display_text().unwrap_or_default().to_string(),
            Self::List(values) => values
                .iter()
                .map(ExpressionValue::display_text)
                .collect::<Vec<_>>()
                .join(", "),
            Self::Tuple(elements) => {
                let inner = elements
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value.display_text()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", inner)
            }
            Self::Resource(resource) => resource
                .qualified_id()
                .unwrap_or_else(|| resource.resource_type.clone()),
        }
    }
}

impl fmt::Display for ExpressionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl From<bool> for ExpressionValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for ExpressionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Decimal> for ExpressionValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for ExpressionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ExpressionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<CodeDef> for ExpressionValue {
    fn from(value: CodeDef) -> Self {
        Self::Code(value)
    }
}

impl From<ConceptDef> for ExpressionValue {
    fn from(value: ConceptDef) -> Self {
        Self::Concept(value)
    }
}

impl From<ResourceValue> for ExpressionValue {
    fn from(value: ResourceValue) -> Self {
        Self::Resource(value)
    }
}

impl From<Vec<ExpressionValue>> for ExpressionValue {
    fn from(values: Vec<ExpressionValue>) -> Self {
        Self::List(values)
    }
}

impl<T: Into<ExpressionValue>> From<Option<T>> for ExpressionValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
