//! Expression engine over precomputed results
//!
//! [`PrecomputedLibraries`] holds, per library, the value every expression
//! and function produced for every subject. It serves those values through
//! [`ExpressionEngine`], hands out engines as an [`EngineFactory`] and
//! answers [`LibraryResolver`] lookups, so measures can be evaluated over
//! results computed elsewhere.
//!
//! Expressions that were declared but have no value for a subject evaluate
//! to null, as a library definition without matching data would.

use async_trait::async_trait;
use octofhir_cqm_types::{ExpressionValue, MemberKey, SubjectRef};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{EngineFactory, ExpressionEngine, ExpressionKind, LibraryIdentifier, LibraryResolver};
use crate::error::EngineError;

type SubjectKey = (String, String);

/// Results of one library, keyed by subject and definition name
#[derive(Debug, Clone, Default)]
pub struct PrecomputedLibrary {
    kinds: HashMap<String, ExpressionKind>,
    results: HashMap<SubjectKey, ExpressionValue>,
    /// `None` input is an invocation without an operand
    function_results: HashMap<SubjectKey, HashMap<Option<MemberKey>, ExpressionValue>>,
    evaluated_resources: HashMap<SubjectKey, Vec<ExpressionValue>>,
    failures: HashMap<SubjectKey, String>,
}

impl PrecomputedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a definition without giving it any value
    pub fn define(mut self, name: impl Into<String>, kind: ExpressionKind) -> Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    pub fn with_result(
        mut self,
        subject: impl Into<String>,
        expression: impl Into<String>,
        value: impl Into<ExpressionValue>,
    ) -> Self {
        let expression = expression.into();
        self.kinds
            .entry(expression.clone())
            .or_insert(ExpressionKind::Scalar);
        self.results.insert((subject.into(), expression), value.into());
        self
    }

    pub fn with_function_result(
        mut self,
        subject: impl Into<String>,
        function: impl Into<String>,
        input: Option<&ExpressionValue>,
        value: impl Into<ExpressionValue>,
    ) -> Self {
        let function = function.into();
        self.kinds
            .entry(function.clone())
            .or_insert(ExpressionKind::Function);
        self.function_results
            .entry((subject.into(), function))
            .or_default()
            .insert(input.map(MemberKey::of), value.into());
        self
    }

    /// Resources reported as touched whenever `name` runs for `subject`
    pub fn with_evaluated_resources(
        mut self,
        subject: impl Into<String>,
        name: impl Into<String>,
        resources: impl IntoIterator<Item = ExpressionValue>,
    ) -> Self {
        self.evaluated_resources
            .entry((subject.into(), name.into()))
            .or_default()
            .extend(resources);
        self
    }

    /// Make `name` fail for `subject`
    pub fn with_failure(
        mut self,
        subject: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures
            .insert((subject.into(), name.into()), message.into());
        self
    }

    pub fn kind(&self, name: &str) -> Option<ExpressionKind> {
        self.kinds.get(name).copied()
    }

    fn failure(&self, key: &SubjectKey) -> Result<(), EngineError> {
        match self.failures.get(key) {
            Some(message) => Err(EngineError::evaluation(key.1.clone(), message.clone())),
            None => Ok(()),
        }
    }
}

/// Shared store of precomputed libraries, looked up by library name
#[derive(Debug, Clone, Default)]
pub struct PrecomputedLibraries {
    libraries: Arc<RwLock<HashMap<String, Arc<PrecomputedLibrary>>>>,
}

impl PrecomputedLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_library(&self, name: impl Into<String>, library: PrecomputedLibrary) {
        let name = name.into();
        log::debug!("Registered precomputed library {}", name);
        self.libraries.write().insert(name, Arc::new(library));
    }

    pub fn library(&self, name: &str) -> Option<Arc<PrecomputedLibrary>> {
        self.libraries.read().get(name).cloned()
    }

    pub fn engine(&self) -> PrecomputedEngine {
        PrecomputedEngine::new(self.clone())
    }
}

impl EngineFactory for PrecomputedLibraries {
    fn create_engine(&self) -> Box<dyn ExpressionEngine> {
        Box::new(self.engine())
    }
}

#[async_trait]
impl LibraryResolver for PrecomputedLibraries {
    type Library = PrecomputedLibrary;

    async fn resolve(
        &self,
        identifier: &LibraryIdentifier,
    ) -> Result<Option<Arc<PrecomputedLibrary>>, EngineError> {
        Ok(self.library(&identifier.name))
    }
}

/// One engine session over a [`PrecomputedLibraries`] store
pub struct PrecomputedEngine {
    libraries: PrecomputedLibraries,
    subject: Option<String>,
    touched: Vec<ExpressionValue>,
}

impl PrecomputedEngine {
    pub fn new(libraries: PrecomputedLibraries) -> Self {
        Self {
            libraries,
            subject: None,
            touched: Vec::new(),
        }
    }

    fn lookup(
        &self,
        library: &LibraryIdentifier,
        name: &str,
    ) -> Result<(Arc<PrecomputedLibrary>, SubjectKey), EngineError> {
        let subject = self
            .subject
            .clone()
            .ok_or_else(|| EngineError::evaluation(name, "no subject in context"))?;
        let content = self
            .libraries
            .library(&library.name)
            .ok_or_else(|| EngineError::undefined_library(library.to_string()))?;
        Ok((content, (subject, name.to_string())))
    }

    fn record_touched(&mut self, content: &PrecomputedLibrary, key: &SubjectKey) {
        if let Some(resources) = content.evaluated_resources.get(key) {
            self.touched.extend(resources.iter().cloned());
        }
    }
}

impl ExpressionEngine for PrecomputedEngine {
    fn set_subject(&mut self, subject: &SubjectRef) -> Result<(), EngineError> {
        self.subject = Some(subject.qualified());
        self.touched.clear();
        Ok(())
    }

    fn evaluate(
        &mut self,
        library: &LibraryIdentifier,
        expression: &str,
    ) -> Result<ExpressionValue, EngineError> {
        let (content, key) = self.lookup(library, expression)?;
        match content.kind(expression) {
            Some(ExpressionKind::Scalar) => {}
            Some(ExpressionKind::Function) => {
                return Err(EngineError::function_not_invoked(library.to_string(), expression));
            }
            None => {
                return Err(EngineError::undefined_expression(library.to_string(), expression));
            }
        }
        content.failure(&key)?;
        self.record_touched(&content, &key);
        Ok(content.results.get(&key).cloned().unwrap_or_default())
    }

    fn invoke_function(
        &mut self,
        library: &LibraryIdentifier,
        function: &str,
        argument: Option<&ExpressionValue>,
    ) -> Result<ExpressionValue, EngineError> {
        let (content, key) = self.lookup(library, function)?;
        match content.kind(function) {
            Some(ExpressionKind::Function) => {}
            Some(ExpressionKind::Scalar) => {
                return Err(EngineError::not_a_function(library.to_string(), function));
            }
            None => {
                return Err(EngineError::undefined_expression(library.to_string(), function));
            }
        }
        content.failure(&key)?;
        self.record_touched(&content, &key);
        Ok(content
            .function_results
            .get(&key)
            .and_then(|values| values.get(&argument.map(MemberKey::of)))
            .cloned()
            .unwrap_or_default())
    }

    fn expression_kind(
        &self,
        library: &LibraryIdentifier,
        name: &str,
    ) -> Result<ExpressionKind, EngineError> {
        let content = self
            .libraries
            .library(&library.name)
            .ok_or_else(|| EngineError::undefined_library(library.to_string()))?;
        content
            .kind(name)
            .ok_or_else(|| EngineError::undefined_expression(library.to_string(), name))
    }

    fn take_evaluated_resources(&mut self) -> Vec<ExpressionValue> {
        std::mem::take(&mut self.touched)
    }
}
