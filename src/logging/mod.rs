//! Logging statistics from training runs
mod chunk;
mod display;
mod stats;

pub use chunk::{ByCounter, ByTime, ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
pub use display::{DisplayBackend, DisplayLogger};
pub use stats::OnlineMeanVariance;

use log::warn;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Identifier of a logged value: a namespace path and a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    namespace: SmallVec<[&'static str; 4]>,
    name: Cow<'static, str>,
}

impl Id {
    pub fn new<S: Into<Cow<'static, str>>>(name: S) -> Self {
        Self {
            namespace: SmallVec::new(),
            name: name.into(),
        }
    }

    /// Prepend a scope to the namespace.
    #[must_use]
    pub fn with_prefix(mut self, scope: &'static str) -> Self {
        self.namespace.insert(0, scope);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &[&'static str] {
        &self.namespace
    }
}

impl From<&'static str> for Id {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Id {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for scope in &self.namespace {
            write!(f, "{}/", scope)?;
        }
        write!(f, "{}", self.name)
    }
}

/// A logged value.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    /// Summarized by mean and standard deviation.
    Scalar(f64),
    /// Summarized by counting occurrences of each distinct message.
    Message(Cow<'static, str>),
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for LogValue {
    fn from(value: f32) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<&'static str> for LogValue {
    fn from(value: &'static str) -> Self {
        Self::Message(value.into())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        Self::Message(value.into())
    }
}

/// Error logging a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogError {
    #[error("\"{id}\": incompatible value {value:?}, expected {expected}")]
    IncompatibleValue {
        id: Id,
        value: LogValue,
        expected: &'static str,
    },
}

/// Log time series statistics.
///
/// Values are logged in groups. Values within a group are associated with the same time step.
pub trait StatsLogger {
    /// Start a new group of values.
    fn group_start(&mut self);

    /// Log a value within the current group.
    ///
    /// # Returns
    /// May return an error if the logged value is structurally incompatible
    /// with previous values logged under the same id.
    fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError>;

    /// End the current group.
    fn group_end(&mut self);

    /// Write out all pending summaries.
    fn flush(&mut self);

    /// Log a single value as its own group.
    fn log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
        self.group_start();
        let result = self.group_log(id, value);
        self.group_end();
        result
    }

    /// Log a scalar value, warning instead of failing on incompatible values.
    fn log_scalar(&mut self, name: &'static str, value: f64) {
        if let Err(err) = self.log(name.into(), value.into()) {
            warn!("{}", err);
        }
    }

    /// Log a message, warning instead of failing on incompatible values.
    fn log_message(&mut self, name: &'static str, message: String) {
        if let Err(err) = self.log(name.into(), message.into()) {
            warn!("{}", err);
        }
    }

    /// Log within a named scope.
    fn with_scope(&mut self, scope: &'static str) -> ScopedLogger<'_>
    where
        Self: Sized,
    {
        ScopedLogger::new(self, scope)
    }
}

/// Logger that does nothing
impl StatsLogger for () {
    fn group_start(&mut self) {}
    fn group_log(&mut self, _: Id, _: LogValue) -> Result<(), LogError> {
        Ok(())
    }
    fn group_end(&mut self) {}
    fn flush(&mut self) {}
}

impl<T: StatsLogger + ?Sized> StatsLogger for &'_ mut T {
    fn group_start(&mut self) {
        T::group_start(self)
    }
    fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
        T::group_log(self, id, value)
    }
    fn group_end(&mut self) {
        T::group_end(self)
    }
    fn flush(&mut self) {
        T::flush(self)
    }
}

/// Logger that prefixes all ids with a scope before forwarding them.
pub struct ScopedLogger<'a> {
    inner: &'a mut dyn StatsLogger,
    scope: &'static str,
}

impl<'a> ScopedLogger<'a> {
    pub fn new(inner: &'a mut dyn StatsLogger, scope: &'static str) -> Self {
        Self { inner, scope }
    }
}

impl StatsLogger for ScopedLogger<'_> {
    fn group_start(&mut self) {
        self.inner.group_start()
    }
    fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
        self.inner.group_log(id.with_prefix(self.scope), value)
    }
    fn group_end(&mut self) {
        self.inner.group_end()
    }
    fn flush(&mut self) {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every logged value.
    #[derive(Default)]
    struct RecordingLogger {
        groups: usize,
        values: Vec<(String, LogValue)>,
    }

    impl StatsLogger for RecordingLogger {
        fn group_start(&mut self) {
            self.groups += 1;
        }
        fn group_log(&mut self, id: Id, value: LogValue) -> Result<(), LogError> {
            self.values.push((id.to_string(), value));
            Ok(())
        }
        fn group_end(&mut self) {}
        fn flush(&mut self) {}
    }

    #[test]
    fn id_display_with_namespace() {
        let id = Id::from("loss").with_prefix("opt").with_prefix("particle");
        assert_eq!(id.to_string(), "particle/opt/loss");
        assert_eq!(id.name(), "loss");
    }

    #[test]
    fn scoped_logger_prefixes_ids() {
        let mut logger = RecordingLogger::default();
        {
            let mut scoped = logger.with_scope("policy");
            scoped.log_scalar("mean_kl", 0.5);
        }
        assert_eq!(logger.groups, 1);
        assert_eq!(
            logger.values,
            vec![("policy/mean_kl".to_string(), LogValue::Scalar(0.5))]
        );
    }

    #[test]
    fn null_logger_accepts_anything() {
        let mut logger = ();
        assert!(logger.log("x".into(), "anything".into()).is_ok());
    }
}
