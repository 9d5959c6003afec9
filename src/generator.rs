use crate::error::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A text-completion backend.
///
/// Given a system instruction and a user message, returns the raw draft.
/// Implementations own transport concerns (timeouts, transport retries);
/// failures surface as `MarketContextError::Transport`.
pub trait TextGenerator: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
        (**self).complete(system, user)
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
        (**self).complete(system, user)
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
        (**self).complete(system, user)
    }
}
