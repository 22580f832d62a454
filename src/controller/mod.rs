//! Controller interface and error wrapping.
//!
//! Every resource kind implements [`ResourceController`]; the engine
//! drives the four operations concurrently across resources, one
//! invocation per resource, each with its own [`OperationContext`].
//! Errors are wrapped with the operation, the resource kind, and the
//! identifier before they reach the engine.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ApiError;
use crate::codec::CodecError;
use crate::locality::LocalityError;
use crate::schema::{Diagnostic, SchemaDescriptor};
use crate::wait::{OperationContext, WaitError};

/// Default deadline for controller operations without a tighter one.
pub const DEFAULT_OPERATION_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// The operation an error occurred in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// Resource creation.
    Create,
    /// State refresh.
    Read,
    /// In-place update.
    Update,
    /// Resource deletion.
    Delete,
    /// Import of an externally created resource.
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        f.write_str(label)
    }
}

/// Result of a Read: the remote resource either exists or is gone. Gone
/// clears the identifier; it is never an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadOutcome<S> {
    /// The resource exists; its decoded state follows.
    Present(S),
    /// The remote answered 404 (or 403 where that encodes deletion).
    Gone,
}

impl<S> ReadOutcome<S> {
    /// Returns the state, if present.
    pub fn into_present(self) -> Option<S> {
        match self {
            Self::Present(state) => Some(state),
            Self::Gone => None,
        }
    }
}

/// The underlying failure inside one controller operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A configuration value failed validation.
    #[error("invalid value for {attribute}: {message}")]
    Validation {
        /// Offending attribute.
        attribute: String,
        /// What was wrong with it.
        message: String,
    },
    /// A change to an immutable attribute was requested.
    #[error("{attribute} cannot be changed in place; the resource must be recreated")]
    Immutable {
        /// The attribute that cannot change.
        attribute: String,
    },
    /// The resource was expected to exist but is gone.
    #[error("resource not found")]
    NotFound,
    /// A conflicting operation is in flight on the remote.
    #[error("conflicting operation in flight: {message}")]
    Conflict {
        /// Remote explanation.
        message: String,
    },
    /// A malformed identifier or scope.
    #[error(transparent)]
    Locality(#[from] LocalityError),
    /// A value failed to convert.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Waiting for convergence failed.
    #[error(transparent)]
    Wait(#[from] WaitError),
    /// The API rejected a request.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A failure wrapped with its operation, resource kind, and identifier.
#[derive(Debug, thiserror::Error)]
#[error("{operation} of {kind} {id:?} failed: {source}")]
pub struct ControllerError {
    /// Operation that failed.
    pub operation: Operation,
    /// Resource kind, e.g. `scaleway_instance_server`.
    pub kind: &'static str,
    /// Locality-qualified identifier, or empty before one is assigned.
    pub id: String,
    /// Underlying failure.
    #[source]
    pub source: OperationError,
}

impl ControllerError {
    /// Wraps an underlying failure with its context.
    pub fn new(
        operation: Operation,
        kind: &'static str,
        id: impl Into<String>,
        source: impl Into<OperationError>,
    ) -> Self {
        Self {
            operation,
            kind,
            id: id.into(),
            source: source.into(),
        }
    }

    /// Renders the error as an engine diagnostic. Validation errors carry
    /// their attribute path.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(
            format!("{} of {} failed", self.operation, self.kind),
            self.source.to_string(),
        );
        match &self.source {
            OperationError::Validation { attribute, .. }
            | OperationError::Immutable { attribute } => diagnostic.with_attribute(attribute.clone()),
            _ => diagnostic,
        }
    }
}

/// Attaches controller context to module-level errors.
pub trait WithOperation<T> {
    /// Wraps the error with operation, kind, and identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] wrapping the original failure.
    fn in_operation(
        self,
        operation: Operation,
        kind: &'static str,
        id: &str,
    ) -> Result<T, ControllerError>;
}

impl<T, E> WithOperation<T> for Result<T, E>
where
    E: Into<OperationError>,
{
    fn in_operation(
        self,
        operation: Operation,
        kind: &'static str,
        id: &str,
    ) -> Result<T, ControllerError> {
        self.map_err(|err| ControllerError::new(operation, kind, id, err))
    }
}

/// Folds an API result into a read outcome, honouring the endpoints that
/// encode deletion as 403.
///
/// # Errors
///
/// Propagates any [`ApiError`] that does not mean "gone".
pub fn outcome_from<T>(
    result: Result<T, ApiError>,
    forbidden_means_gone: bool,
) -> Result<ReadOutcome<T>, ApiError> {
    match result {
        Ok(value) => Ok(ReadOutcome::Present(value)),
        Err(err) if err.is_gone(forbidden_means_gone) => Ok(ReadOutcome::Gone),
        Err(err) => Err(err),
    }
}

/// Treats "gone" as success, for idempotent deletes.
///
/// # Errors
///
/// Propagates any [`ApiError`] that does not mean "gone".
pub fn ignore_gone(result: Result<(), ApiError>, forbidden_means_gone: bool) -> Result<(), ApiError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_gone(forbidden_means_gone) => Ok(()),
        Err(err) => Err(err),
    }
}

/// One resource kind's reconciliation surface.
///
/// Implementations orchestrate the locality codec, the value codec, the
/// waiter, and the typed API clients; they hold no per-operation state of
/// their own.
#[async_trait]
pub trait ResourceController: Send + Sync {
    /// Declared configuration for this kind.
    type Config: Send + Sync;
    /// Stored state snapshot for this kind.
    type State: Send + Sync;

    /// Resource kind name at the engine boundary.
    const KIND: &'static str;

    /// Timeout the engine should build [`OperationContext`]s with for this
    /// kind. Slow kinds (compute servers) override this upward; quick ones
    /// (address bookings) downward.
    fn operation_timeout(&self) -> Duration {
        DEFAULT_OPERATION_DEADLINE
    }

    /// Attribute surface exposed to the engine.
    fn schema(&self) -> SchemaDescriptor;

    /// Creates the resource, waits for it to settle, and reads it back.
    async fn create(
        &self,
        ctx: &OperationContext,
        config: &Self::Config,
    ) -> Result<(String, Self::State), ControllerError>;

    /// Refreshes state; `Gone` clears the identifier.
    async fn read(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<ReadOutcome<Self::State>, ControllerError>;

    /// Applies in-place changes and reads the result back.
    async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        config: &Self::Config,
    ) -> Result<Self::State, ControllerError>;

    /// Deletes the resource and waits for it to vanish. Deleting a
    /// resource that is already gone succeeds.
    async fn delete(&self, ctx: &OperationContext, id: &str) -> Result<(), ControllerError>;

    /// Imports an externally created resource from its raw
    /// locality-qualified identifier. The default reads the resource and
    /// hands back the state a later Read will refresh; importing an
    /// identifier that resolves to nothing is an error, not a gone.
    async fn import(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<Self::State, ControllerError> {
        match self.read(ctx, id).await? {
            ReadOutcome::Present(state) => Ok(state),
            ReadOutcome::Gone => Err(ControllerError::new(
                Operation::Import,
                Self::KIND,
                id,
                OperationError::NotFound,
            )),
        }
    }
}

#[cfg(test)]
mod tests;
