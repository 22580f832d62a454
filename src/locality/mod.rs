//! Locality-qualified resource identifiers.
//!
//! Every Scaleway resource identifier carries the zone or region it was
//! created in: `{scope}/{uuid}`, or `{scope}/{parent-uuid}/{child-key}` for
//! nested resources. References between resources must tolerate prefixed and
//! bare forms interchangeably, so equality is defined over the UUID component
//! alone.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

mod error;

pub use error::LocalityError;

/// A city-level availability zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Zone {
    /// Paris 1 (`fr-par-1`).
    FrPar1,
    /// Paris 2 (`fr-par-2`).
    FrPar2,
    /// Paris 3 (`fr-par-3`).
    FrPar3,
    /// Amsterdam 1 (`nl-ams-1`).
    NlAms1,
    /// Amsterdam 2 (`nl-ams-2`).
    NlAms2,
    /// Amsterdam 3 (`nl-ams-3`).
    NlAms3,
    /// Warsaw 1 (`pl-waw-1`).
    PlWaw1,
    /// Warsaw 2 (`pl-waw-2`).
    PlWaw2,
    /// Warsaw 3 (`pl-waw-3`).
    PlWaw3,
}

impl Zone {
    /// All zones the public API serves.
    pub const ALL: [Self; 9] = [
        Self::FrPar1,
        Self::FrPar2,
        Self::FrPar3,
        Self::NlAms1,
        Self::NlAms2,
        Self::NlAms3,
        Self::PlWaw1,
        Self::PlWaw2,
        Self::PlWaw3,
    ];

    /// Returns the region this zone belongs to. Each zone belongs to exactly
    /// one region.
    #[must_use]
    pub const fn region(self) -> Region {
        match self {
            Self::FrPar1 | Self::FrPar2 | Self::FrPar3 => Region::FrPar,
            Self::NlAms1 | Self::NlAms2 | Self::NlAms3 => Region::NlAms,
            Self::PlWaw1 | Self::PlWaw2 | Self::PlWaw3 => Region::PlWaw,
        }
    }

    /// Returns the wire representation (for example `fr-par-1`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FrPar1 => "fr-par-1",
            Self::FrPar2 => "fr-par-2",
            Self::FrPar3 => "fr-par-3",
            Self::NlAms1 => "nl-ams-1",
            Self::NlAms2 => "nl-ams-2",
            Self::NlAms3 => "nl-ams-3",
            Self::PlWaw1 => "pl-waw-1",
            Self::PlWaw2 => "pl-waw-2",
            Self::PlWaw3 => "pl-waw-3",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = LocalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|zone| zone.as_str() == s)
            .ok_or_else(|| LocalityError::MalformedScope {
                scope: s.to_owned(),
            })
    }
}

/// A country-level region containing one or more zones.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Region {
    /// Paris (`fr-par`).
    FrPar,
    /// Amsterdam (`nl-ams`).
    NlAms,
    /// Warsaw (`pl-waw`).
    PlWaw,
}

impl Region {
    /// All regions the public API serves.
    pub const ALL: [Self; 3] = [Self::FrPar, Self::NlAms, Self::PlWaw];

    /// Returns the wire representation (for example `fr-par`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FrPar => "fr-par",
            Self::NlAms => "nl-ams",
            Self::PlWaw => "pl-waw",
        }
    }

    /// Returns the first zone of the region, used when an API requires a zone
    /// but the caller only configured a region.
    #[must_use]
    pub const fn default_zone(self) -> Zone {
        match self {
            Self::FrPar => Zone::FrPar1,
            Self::NlAms => Zone::NlAms1,
            Self::PlWaw => Zone::PlWaw1,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = LocalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|region| region.as_str() == s)
            .ok_or_else(|| LocalityError::MalformedScope {
                scope: s.to_owned(),
            })
    }
}

/// A scope qualifier: either a zone or a region.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Locality {
    /// Zone-scoped resources (compute, flexible IPs, ...).
    Zone(Zone),
    /// Region-scoped resources (managed databases, private networks, ...).
    Region(Region),
}

impl Locality {
    /// Returns the region of this scope, widening a zone to its parent.
    #[must_use]
    pub const fn region(self) -> Region {
        match self {
            Self::Zone(zone) => zone.region(),
            Self::Region(region) => region,
        }
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone(zone) => zone.fmt(f),
            Self::Region(region) => region.fmt(f),
        }
    }
}

impl FromStr for Locality {
    type Err = LocalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::from_str(s).map_or_else(
            |_| Region::from_str(s).map(Self::Region),
            |zone| Ok(Self::Zone(zone)),
        )
    }
}

impl From<Zone> for Locality {
    fn from(zone: Zone) -> Self {
        Self::Zone(zone)
    }
}

impl From<Region> for Locality {
    fn from(region: Region) -> Self {
        Self::Region(region)
    }
}

/// Encodes a scope-qualified identifier as `{scope}/{uuid}`.
#[must_use]
pub fn encode(scope: impl Into<Locality>, uuid: &Uuid) -> String {
    format!("{}/{uuid}", scope.into())
}

/// Encodes a nested identifier as `{scope}/{parent-uuid}/{child-key}`.
///
/// The child key may itself contain slashes; they are preserved verbatim.
#[must_use]
pub fn encode_nested(scope: impl Into<Locality>, parent: &Uuid, child_key: &str) -> String {
    format!("{}/{parent}/{child_key}", scope.into())
}

/// Decodes a `{scope}/{uuid}` identifier.
///
/// # Errors
///
/// Returns [`LocalityError::MalformedId`] when the identifier does not split
/// into exactly two components or the second is not a valid UUID, and
/// [`LocalityError::MalformedScope`] when the scope is unknown.
pub fn decode(id: &str) -> Result<(Locality, Uuid), LocalityError> {
    let mut parts = id.splitn(2, '/');
    let (Some(scope), Some(rest)) = (parts.next(), parts.next()) else {
        return Err(LocalityError::MalformedId {
            id: id.to_owned(),
            reason: String::from("expected {scope}/{uuid}"),
        });
    };
    let locality = Locality::from_str(scope)?;
    let uuid = Uuid::parse_str(rest).map_err(|err| LocalityError::MalformedId {
        id: id.to_owned(),
        reason: err.to_string(),
    })?;
    Ok((locality, uuid))
}

/// Decodes a `{scope}/{parent-uuid}/{child-key}` identifier.
///
/// # Errors
///
/// Returns [`LocalityError::MalformedId`] when the identifier does not carry
/// three components or the parent is not a valid UUID, and
/// [`LocalityError::MalformedScope`] when the scope is unknown.
pub fn decode_nested(id: &str) -> Result<(Locality, Uuid, String), LocalityError> {
    let mut parts = id.splitn(3, '/');
    let (Some(scope), Some(parent), Some(child)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(LocalityError::MalformedId {
            id: id.to_owned(),
            reason: String::from("expected {scope}/{parent-uuid}/{child-key}"),
        });
    };
    let locality = Locality::from_str(scope)?;
    let parent_uuid = Uuid::parse_str(parent).map_err(|err| LocalityError::MalformedId {
        id: id.to_owned(),
        reason: err.to_string(),
    })?;
    Ok((locality, parent_uuid, child.to_owned()))
}

/// Returns the right-most slash-delimited component that parses as a UUID.
///
/// Resource references vary by provenance: users may write a bare UUID, a
/// scope-prefixed identifier, or a nested identifier. When no component is a
/// UUID the input is returned unchanged so validation can report it.
#[must_use]
pub fn expand_last_uuid(input: &str) -> String {
    input
        .rsplit('/')
        .find_map(|part| Uuid::parse_str(part).ok())
        .map_or_else(|| input.to_owned(), |uuid| uuid.to_string())
}

/// Compares two identifiers by UUID component alone, ignoring any scope
/// prefix. This is the diff-suppression contract for reference attributes.
#[must_use]
pub fn equal_ignoring_scope(a: &str, b: &str) -> bool {
    expand_last_uuid(a) == expand_last_uuid(b)
}

#[cfg(test)]
mod tests;
