//! Seams to the expression engine and library resolution
//!
//! The measure engine never evaluates logic itself. It asks an
//! [`ExpressionEngine`] for named expression results, invokes named functions
//! with a single argument, and drains the engine's evaluated-resource audit
//! set after every call. One engine instance serves one subject at a time;
//! parallel evaluation asks an [`EngineFactory`] for one engine per worker.

use async_trait::async_trait;
use futures::future::join_all;
use octofhir_cqm_types::{ExpressionValue, SubjectRef};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, MeasureError, MeasureResult};

/// Name and optional version of a logic library
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryIdentifier {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl LibraryIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

impl fmt::Display for LibraryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}|{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// What a library definition is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    /// Callable definition taking operands
    Function,
    /// Plain named expression evaluated in subject context
    Scalar,
}

/// Expression engine collaborator
pub trait ExpressionEngine {
    /// Switch to `subject`, discarding any cached results of the previous one
    fn set_subject(&mut self, subject: &SubjectRef) -> Result<(), EngineError>;

    /// Evaluate a named plain expression for the current subject
    fn evaluate(
        &mut self,
        library: &LibraryIdentifier,
        expression: &str,
    ) -> Result<ExpressionValue, EngineError>;

    /// Invoke a named function; `argument` binds its single operand
    fn invoke_function(
        &mut self,
        library: &LibraryIdentifier,
        function: &str,
        argument: Option<&ExpressionValue>,
    ) -> Result<ExpressionValue, EngineError>;

    /// Resolve what kind of definition `name` is
    fn expression_kind(
        &self,
        library: &LibraryIdentifier,
        name: &str,
    ) -> Result<ExpressionKind, EngineError>;

    /// Drain the resources touched since the last call
    fn take_evaluated_resources(&mut self) -> Vec<ExpressionValue>;
}

impl<E: ExpressionEngine + ?Sized> ExpressionEngine for Box<E> {
    fn set_subject(&mut self, subject: &SubjectRef) -> Result<(), EngineError> {
        (**self).set_subject(subject)
    }

    fn evaluate(
        &mut self,
        library: &LibraryIdentifier,
        expression: &str,
    ) -> Result<ExpressionValue, EngineError> {
        (**self).evaluate(library, expression)
    }

    fn invoke_function(
        &mut self,
        library: &LibraryIdentifier,
        function: &str,
        argument: Option<&ExpressionValue>,
    ) -> Result<ExpressionValue, EngineError> {
        (**self).invoke_function(library, function, argument)
    }

    fn expression_kind(
        &self,
        library: &LibraryIdentifier,
        name: &str,
    ) -> Result<ExpressionKind, EngineError> {
        (**self).expression_kind(library, name)
    }

    fn take_evaluated_resources(&mut self) -> Vec<ExpressionValue> {
        (**self).take_evaluated_resources()
    }
}

/// Creates one engine session per evaluation worker
pub trait EngineFactory: Send + Sync {
    fn create_engine(&self) -> Box<dyn ExpressionEngine>;
}

/// Resolves library identifiers to their compiled form
#[async_trait]
pub trait LibraryResolver: Send + Sync {
    type Library: Send + Sync;

    /// `Ok(None)` when the library has no content
    async fn resolve(
        &self,
        identifier: &LibraryIdentifier,
    ) -> Result<Option<Arc<Self::Library>>, EngineError>;
}

/// Resolve every identifier concurrently. Fails with every identifier that
/// could not be resolved.
pub async fn resolve_libraries<R>(
    resolver: &R,
    identifiers: &[LibraryIdentifier],
) -> MeasureResult<Vec<(LibraryIdentifier, Arc<R::Library>)>>
where
    R: LibraryResolver + ?Sized,
{
    let outcomes = join_all(identifiers.iter().map(|identifier| resolver.resolve(identifier))).await;

    let mut resolved = Vec::with_capacity(identifiers.len());
    let mut failed = Vec::new();
    let mut messages = Vec::new();

    for (identifier, outcome) in identifiers.iter().zip(outcomes) {
        match outcome {
            Ok(Some(library)) => resolved.push((identifier.clone(), library)),
            Ok(None) => {
                failed.push(identifier.to_string());
                messages.push(format!("no content for {}", identifier));
            }
            Err(err) => {
                failed.push(identifier.to_string());
                messages.push(err.to_string());
            }
        }
    }

    if failed.is_empty() {
        Ok(resolved)
    } else {
        log::error!("Library resolution failed for {}", failed.join(", "));
        Err(MeasureError::library_resolution(failed, messages.join("; ")))
    }
}

/// Memoizes successful resolutions of an inner resolver
pub struct CachingLibraryResolver<R: LibraryResolver> {
    inner: R,
    cache: RwLock<HashMap<LibraryIdentifier, Arc<R::Library>>>,
}

impl<R: LibraryResolver> CachingLibraryResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

#[async_trait]
impl<R: LibraryResolver> LibraryResolver for CachingLibraryResolver<R> {
    type Library = R::Library;

    async fn resolve(
        &self,
        identifier: &LibraryIdentifier,
    ) -> Result<Option<Arc<Self::Library>>, EngineError> {
        if let Some(library) = self.cache.read().get(identifier) {
            return Ok(Some(Arc::clone(library)));
        }

        let resolved = self.inner.resolve(identifier).await?;
        if let Some(library) = &resolved {
            self.cache
                .write()
                .insert(identifier.clone(), Arc::clone(library));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticResolver {
        known: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LibraryResolver for StaticResolver {
        type Library = String;

        async fn resolve(
            &self,
            identifier: &LibraryIdentifier,
        ) -> Result<Option<Arc<String>>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if identifier.name == "Broken" {
                return Err(EngineError::undefined_library("Broken"));
            }
            Ok(self
                .known
                .contains(&identifier.name.as_str())
                .then(|| Arc::new(format!("compiled {}", identifier))))
        }
    }

    #[test]
    fn test_library_identifier_display() {
        assert_eq!(LibraryIdentifier::new("Lib").to_string(), "Lib");
        assert_eq!(
            LibraryIdentifier::versioned("Lib", "1.0.0").to_string(),
            "Lib|1.0.0"
        );
    }

    #[tokio::test]
    async fn test_resolve_libraries_reports_every_failure() {
        let resolver = StaticResolver {
            known: vec!["Good"],
            calls: AtomicUsize::new(0),
        };
        let ids = vec![
            LibraryIdentifier::new("Good"),
            LibraryIdentifier::versioned("Missing", "2"),
            LibraryIdentifier::new("Broken"),
        ];

        let err = resolve_libraries(&resolver, &ids).await.unwrap_err();
        match err {
            MeasureError::LibraryResolution { identifiers, .. } => {
                assert_eq!(identifiers, vec!["Missing|2".to_string(), "Broken".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_caching_resolver() {
        let resolver = CachingLibraryResolver::new(StaticResolver {
            known: vec!["Good"],
            calls: AtomicUsize::new(0),
        });
        let ids = vec![LibraryIdentifier::new("Good")];

        let first = resolve_libraries(&resolver, &ids).await.unwrap();
        let second = resolve_libraries(&resolver, &ids).await.unwrap();

        assert_eq!(first[0].1.as_str(), "compiled Good");
        assert!(Arc::ptr_eq(&first[0].1, &second[0].1));
        assert_eq!(resolver.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached(), 1);
    }
}
