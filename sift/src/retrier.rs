//! Retry policy for failed attempts
//!
//! The dispatcher asks the [`Retrier`] after every failed attempt whether
//! to try again and how long to wait first. Without an explicit retrier the
//! client uses a [`BackoffRetrier`] built from `max_retries` and the backoff
//! options of its configuration.

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a failed attempt is retried
pub trait Retrier: Send + Sync {
    /// Wait before retry number `retry` (counting from 1) after `err`, or
    /// `None` to give up and surface `err`
    fn retry(&self, retry: u32, err: &Error) -> Option<Duration>;
}

impl<T: Retrier + ?Sized> Retrier for Arc<T> {
    fn retry(&self, retry: u32, err: &Error) -> Option<Duration> {
        (**self).retry(retry, err)
    }
}

/// Never retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetries;

impl Retrier for NoRetries {
    fn retry(&self, _retry: u32, _err: &Error) -> Option<Duration> {
        None
    }
}

/// Up to `max_retries` retries with a jittered, doubling, capped wait
#[derive(Debug, Clone)]
pub struct BackoffRetrier {
    max_retries: u32,
    initial: Duration,
    max: Duration,
}

impl BackoffRetrier {
    pub fn new(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            initial,
            max,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.backoff_initial(), config.backoff_max())
    }
}

impl Retrier for BackoffRetrier {
    fn retry(&self, retry: u32, _err: &Error) -> Option<Duration> {
        if retry > self.max_retries {
            return None;
        }
        Some(Backoff::new(self.initial, self.max).nth_wait(retry))
    }
}
