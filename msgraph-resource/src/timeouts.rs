use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Operation, Result};

/// Operation time limits, written as `"30m"`, `"90s"`, `"1h 30m"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub create: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub read: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub update: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Duration>,
}

impl Timeouts {
    pub const DEFAULT: Duration = Duration::from_secs(30 * 60);
    pub const DEFAULT_READ: Duration = Duration::from_secs(5 * 60);

    pub fn create(&self) -> Duration {
        self.create.unwrap_or(Self::DEFAULT)
    }

    pub fn read(&self) -> Duration {
        self.read.unwrap_or(Self::DEFAULT_READ)
    }

    pub fn update(&self) -> Duration {
        self.update.unwrap_or(Self::DEFAULT)
    }

    pub fn delete(&self) -> Duration {
        self.delete.unwrap_or(Self::DEFAULT)
    }

    pub fn is_default(&self) -> bool {
        *self == Timeouts::default()
    }
}

/// Run `future`, giving up after `limit`.
///
/// Retries performed by the client happen within the limit.
pub async fn with_deadline<T>(
    operation: Operation,
    limit: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::DeadlineExceeded {
            operation,
            timeout: limit,
        }),
    }
}
