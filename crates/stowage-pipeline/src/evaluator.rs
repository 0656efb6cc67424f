//! Stage execution shared by ingestion and variant derivation.
//!
//! Filters are fail-fast: the first one that rejects aborts the run and its
//! message is surfaced verbatim. Transformers are a reducer: each receives the
//! previous one's output.

use std::fmt;
use std::sync::Arc;
use stowage_core::{FileError, FileResult};

type CheckFn<T> = dyn Fn(&T) -> FileResult<bool> + Send + Sync;
type ApplyFn<T> = dyn Fn(T) -> FileResult<T> + Send + Sync;

/// A named predicate. Returning `false` rejects with `message`.
pub struct Filter<T> {
    name: String,
    message: String,
    check: Arc<CheckFn<T>>,
}

impl<T> Filter<T> {
    pub fn new<F>(name: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::try_new(name, message, move |subject| Ok(check(subject)))
    }

    /// Like [`Filter::new`] for checks that can fail on their own.
    pub fn try_new<F>(name: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&T) -> FileResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            message: message.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn check(&self, subject: &T) -> FileResult<()> {
        if (self.check)(subject)? {
            Ok(())
        } else {
            Err(FileError::Validation(self.message.clone()))
        }
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            message: self.message.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish()
    }
}

/// A named step mapping a value to its successor.
pub struct Transformer<T> {
    name: String,
    apply: Arc<ApplyFn<T>>,
}

impl<T> Transformer<T> {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(T) -> FileResult<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, subject: T) -> FileResult<T> {
        (self.apply)(subject)
    }
}

impl<T> Clone for Transformer<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T> fmt::Debug for Transformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name)
            .finish()
    }
}

/// One declared stage.
#[derive(Debug)]
pub enum Stage<T> {
    Filter(Filter<T>),
    Transformer(Transformer<T>),
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        match self {
            Stage::Filter(f) => Stage::Filter(f.clone()),
            Stage::Transformer(t) => Stage::Transformer(t.clone()),
        }
    }
}

impl<T> From<Filter<T>> for Stage<T> {
    fn from(filter: Filter<T>) -> Self {
        Stage::Filter(filter)
    }
}

impl<T> From<Transformer<T>> for Stage<T> {
    fn from(transformer: Transformer<T>) -> Self {
        Stage::Transformer(transformer)
    }
}

/// Ordered filters and transformers. Filters always run before transformers,
/// each group in declared order.
#[derive(Debug)]
pub struct Pipeline<T> {
    filters: Vec<Filter<T>>,
    transformers: Vec<Transformer<T>>,
}

impl<T> Pipeline<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            transformers: Vec::new(),
        }
    }

    pub fn from_stages(stages: impl IntoIterator<Item = Stage<T>>) -> Self {
        let mut pipeline = Self::new();
        for stage in stages {
            pipeline.push(stage);
        }
        pipeline
    }

    pub fn push(&mut self, stage: Stage<T>) {
        match stage {
            Stage::Filter(f) => self.filters.push(f),
            Stage::Transformer(t) => self.transformers.push(t),
        }
    }

    pub fn filter(mut self, filter: Filter<T>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn transform(mut self, transformer: Transformer<T>) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Put `filter` ahead of the declared filters.
    pub fn prepend_filter(mut self, filter: Filter<T>) -> Self {
        self.filters.insert(0, filter);
        self
    }

    pub fn filters(&self) -> &[Filter<T>] {
        &self.filters
    }

    pub fn transformers(&self) -> &[Transformer<T>] {
        &self.transformers
    }

    pub fn len(&self) -> usize {
        self.filters.len() + self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            transformers: self.transformers.clone(),
        }
    }
}

/// Runs pipelines. Stateless.
pub struct Evaluator;

impl Evaluator {
    /// Run `filters` in order against `subject`, stopping at the first rejection.
    pub fn filters<T>(filters: &[Filter<T>], subject: &T) -> FileResult<()> {
        for filter in filters {
            tracing::debug!(filter = %filter.name(), "Running filter");
            if let Err(e) = filter.check(subject) {
                tracing::warn!(filter = %filter.name(), error = %e, "Filter rejected file");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Thread `subject` through `transformers`, each output feeding the next.
    pub fn transformers<T>(transformers: &[Transformer<T>], subject: T) -> FileResult<T> {
        transformers.iter().try_fold(subject, |current, transformer| {
            tracing::debug!(transformer = %transformer.name(), "Running transformer");
            transformer.apply(current)
        })
    }

    /// Filters, then transformers.
    pub fn evaluate<T>(pipeline: &Pipeline<T>, subject: T) -> FileResult<T> {
        Self::filters(pipeline.filters(), &subject)?;
        Self::transformers(pipeline.transformers(), subject)
    }
}
