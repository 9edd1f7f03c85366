//! Error types shared by the gateway client, the stores and the proxy manager

use std::fmt;
use thiserror::Error;

/// The sub-step of a manager operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    LoadMetadata,
    PersistMetadata,
    BuildRoute,
    AllocateServerName,
    ResolveServerName,
    ApplyToGateway,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::LoadMetadata => "load metadata",
            Step::PersistMetadata => "persist metadata",
            Step::BuildRoute => "build route",
            Step::AllocateServerName => "allocate server name",
            Step::ResolveServerName => "resolve server name",
            Step::ApplyToGateway => "apply to gateway",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The gateway could not be reached, or the request could not be built
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway answered with a status >= 400
    #[error("gateway error {status}: {body}")]
    Gateway { status: u16, body: String },

    /// A record or gateway object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A gateway route could not be turned back into a proxy record
    #[error("conversion error: {0}")]
    Conversion(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A manager operation failed at `step`
    #[error("{step}: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True when the underlying failure is a missing record or object
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound(_) => true,
            Error::Gateway { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// The innermost error, with all step wrapping removed
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// The outermost step this error was tagged with, if any
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tags a failure with the manager step it happened in
pub trait StepExt<T> {
    fn step(self, step: Step) -> Result<T>;
}

impl<T> StepExt<T> for Result<T> {
    fn step(self, step: Step) -> Result<T> {
        self.map_err(|source| Error::Step {
            step,
            source: Box::new(source),
        })
    }
}
