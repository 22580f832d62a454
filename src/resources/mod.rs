//! Per-kind resource controllers.
//!
//! Each submodule implements [`crate::controller::ResourceController`] for
//! one resource kind, orchestrating the locality codec, the value codec,
//! the waiter, the collection reconcilers, and the typed API clients.
//! Controllers hold a shared [`crate::session::Session`] and nothing else;
//! all per-operation state lives in the operation context and arguments.

use std::time::Duration;

use crate::controller::OperationError;
use crate::locality::{Locality, LocalityError, Region, Zone};

pub mod applesilicon;
pub mod batch;
pub mod domain;
pub mod flexible_ip;
pub mod instance_ip;
pub mod instance_server;
pub mod iot;
pub mod ipam;
pub mod load_balancer;
pub mod mnq;
pub mod object_bucket;
pub mod rdb;
pub mod security_group;
pub mod vpc;

/// Deadline for compute-server state transitions.
pub const SERVER_DEADLINE: Duration = Duration::from_secs(10 * 60);
/// Deadline for Apple-silicon server operations.
pub const APPLE_SILICON_DEADLINE: Duration = Duration::from_secs(2 * 60);
/// Deadline for flexible-IP operations.
pub const FLEXIBLE_IP_DEADLINE: Duration = Duration::from_secs(60);

/// Builds a validation failure for one attribute.
pub(crate) fn validation(attribute: &str, message: impl Into<String>) -> OperationError {
    OperationError::Validation {
        attribute: attribute.to_owned(),
        message: message.into(),
    }
}

/// Extracts the zone from a decoded identifier scope.
pub(crate) fn zone_scope(scope: Locality, id: &str) -> Result<Zone, OperationError> {
    match scope {
        Locality::Zone(zone) => Ok(zone),
        Locality::Region(_) => Err(OperationError::Locality(LocalityError::MalformedId {
            id: id.to_owned(),
            reason: String::from("expected a zone-qualified identifier"),
        })),
    }
}

/// Extracts the region from a decoded identifier scope.
pub(crate) fn region_scope(scope: Locality, id: &str) -> Result<Region, OperationError> {
    match scope {
        Locality::Region(region) => Ok(region),
        Locality::Zone(_) => Err(OperationError::Locality(LocalityError::MalformedId {
            id: id.to_owned(),
            reason: String::from("expected a region-qualified identifier"),
        })),
    }
}
