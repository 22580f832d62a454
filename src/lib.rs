//! Reconciliation core of a declarative Scaleway provider.
//!
//! The crate turns declared resource configurations into API calls and
//! settled state snapshots. Identifiers are locality-qualified
//! (`{zone|region}/{uuid}`), writes that land in a transitional state are
//! followed by a status wait, and unordered remote collections are
//! reconciled by content rather than position.
//!
//! The pieces compose bottom-up:
//!
//! - [`locality`] encodes and decodes scoped identifiers;
//! - [`codec`] normalises wire values (port ranges, booleans, sizes);
//! - [`transport`] is the retrying HTTP layer; [`api`] the typed clients;
//! - [`wait`] polls resources to a target status under a deadline;
//! - [`diff`] reconciles nested collections positionally or by content;
//! - [`server_state`] plans compute power transitions;
//! - [`schema`], [`controller`], and [`resources`] expose the per-kind
//!   CRUD surface; [`datasource`] the read-only lookups;
//! - [`session`] holds credentials, defaults, and shared clients.

pub mod api;
pub mod codec;
pub mod controller;
pub mod datasource;
pub mod diff;
pub mod locality;
pub mod resources;
pub mod schema;
pub mod server_state;
pub mod session;
pub mod transport;
pub mod wait;

pub use api::{ApiClient, ApiError, Credentials};
pub use controller::{
    ControllerError, Operation, OperationError, ReadOutcome, ResourceController,
};
pub use locality::{Locality, LocalityError, Region, Zone};
pub use schema::{Attribute, AttributeKind, Diagnostic, Diagnostics, SchemaDescriptor};
pub use session::{ProviderConfig, Session, SessionError};
pub use wait::{Observation, OperationContext, WaitError, DEFAULT_POLL_INTERVAL};
