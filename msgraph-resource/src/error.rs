use std::{fmt, time::Duration};

/// A failed request, as reported by a [`crate::client::GraphClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The API answered with an unexpected status.
    #[error("unexpected status {status}: {code}: {message}")]
    Response {
        status: u16,
        code: String,
        message: String,
    },
    /// No response was received.
    #[error("request failed: {0}")]
    Transport(String),
    /// A response was received, but it is not what was expected.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The lifecycle step an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Action,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create resource",
            Operation::Read => "read resource",
            Operation::Update => "update resource",
            Operation::Delete => "delete resource",
            Operation::Action => "execute action",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to {operation}: {source}")]
    Transport {
        operation: Operation,
        source: ClientError,
    },
    /// The configured body or inputs cannot be used; nothing was sent.
    #[error("invalid resource inputs: {0}")]
    MalformedBody(String),
    /// The persisted state of the resource cannot be parsed.
    #[error("invalid prior state: {0}")]
    PriorStateInvalid(String),
    #[error("failed to {operation}: timed out after {timeout:?}")]
    DeadlineExceeded {
        operation: Operation,
        timeout: Duration,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid import id {0:?}: expected a resource URL such as \"groups/<id>\" or \"groups/<id>/members/<id>/$ref\"")]
    InvalidImportId(String),
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),
    #[error("{0}")]
    NotSupported(String),
}

impl Error {
    /// Label a client error with the operation it happened in.
    pub fn transport(operation: Operation) -> impl FnOnce(ClientError) -> Error {
        move |source| Error::Transport { operation, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
