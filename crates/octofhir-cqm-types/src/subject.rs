//! Qualified subject identifiers (`Type/id`)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::value::{ExpressionValue, ResourceValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Unable to determine Subject type for id: {0}. SubjectIds must be in the format {{subjectType}}/{{subjectId}} (e.g. Patient/123)"
)]
pub struct InvalidSubjectId(pub String);

/// A subject of evaluation, e.g. `Patient/123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    subject_type: String,
    id: String,
}

impl SubjectRef {
    pub fn new(subject_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            id: id.into(),
        }
    }

    /// Parse `Type/id`. Trailing segments such as `/_history/1` are ignored.
    pub fn parse(qualified: &str) -> Result<Self, InvalidSubjectId> {
        let mut parts = qualified.split('/');
        match (parts.next(), parts.next()) {
            (Some(subject_type), Some(id)) if !subject_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(subject_type, id))
            }
            _ => Err(InvalidSubjectId(qualified.to_string())),
        }
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `Type/id`
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.subject_type, self.id)
    }

    /// Reference value standing for the subject in boolean-basis populations
    pub fn to_value(&self) -> ExpressionValue {
        ExpressionValue::Resource(ResourceValue::reference(&self.subject_type, &self.id))
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject_type, self.id)
    }
}

impl FromStr for SubjectRef {
    type Err = InvalidSubjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified() {
        let subject = SubjectRef::parse("Patient/123").unwrap();
        assert_eq!(subject.subject_type(), "Patient");
        assert_eq!(subject.id(), "123");
        assert_eq!(subject.to_string(), "Patient/123");
    }

    #[test]
    fn test_parse_ignores_history() {
        let subject = SubjectRef::parse("Patient/123/_history/2").unwrap();
        assert_eq!(subject.id(), "123");
    }

    #[test]
    fn test_parse_rejects_unqualified() {
        for bad in ["123", "", "/123", "Patient/"] {
            let err = SubjectRef::parse(bad).unwrap_err();
            assert!(err.to_string().contains("Unable to determine Subject type"));
        }
    }
}
