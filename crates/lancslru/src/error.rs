//! Error types for lancslru

use std::error::Error as StdError;
use std::fmt;

/// A cache cannot be built with a capacity of zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError;

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache capacity must be greater than zero")
    }
}

impl StdError for CapacityError {}

/// The loader passed to [`Cache::lookup`](crate::Cache::lookup) failed
///
/// The loader's error is kept unchanged so callers can still recognise
/// distinguished conditions such as "not found".
#[derive(Debug)]
pub struct LoadError<E> {
    source: E,
}

impl<E> LoadError<E> {
    pub(crate) fn new(source: E) -> Self {
        Self { source }
    }

    /// The loader's error
    pub fn inner(&self) -> &E {
        &self.source
    }

    /// Unwrap into the loader's error
    pub fn into_inner(self) -> E {
        self.source
    }
}

impl<E: fmt::Display> fmt::Display for LoadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loading value for key: {}", self.source)
    }
}

impl<E> StdError for LoadError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}
