//! Conversions between configuration values and API wire values.
//!
//! Each conversion is symmetric: the encode side turns what the user wrote
//! into what the API expects, the decode side normalizes what the API
//! returned into the form stored in engine state. Normalization is what
//! keeps semantically-equivalent representations (`"60s"` vs `"1m"`, a bare
//! IP vs its `/32` subnet) from producing spurious diffs.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors raised while converting configuration values.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CodecError {
    /// Raised when an IP or CIDR string cannot be parsed.
    #[error("malformed CIDR {input}: {reason}")]
    MalformedCidr {
        /// Value as supplied by the caller.
        input: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Raised when a duration string cannot be parsed.
    #[error("unparsable duration: {input}")]
    UnparsableDuration {
        /// Value as supplied by the caller.
        input: String,
    },
    /// Raised when a port is absent from the valid range.
    #[error("port {end} {value}, with error: address {value}: invalid port")]
    InvalidPort {
        /// Which end of the range failed (`from` or `to`).
        end: &'static str,
        /// Offending value as written.
        value: String,
    },
    /// Raised when a timestamp string is not RFC 3339.
    #[error("malformed timestamp {input}: {reason}")]
    MalformedTimestamp {
        /// Value as supplied by the caller.
        input: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Maps an empty configuration string to "unset".
#[must_use]
pub fn empty_as_none(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

/// Maps an absent remote value to the empty string the engine stores.
#[must_use]
pub fn none_as_empty(value: Option<&str>) -> String {
    value.unwrap_or_default().to_owned()
}

/// Parses a human-readable duration such as `30s`, `10m`, `1h30m`, `250ms`.
///
/// # Errors
///
/// Returns [`CodecError::UnparsableDuration`] when the string is empty or
/// carries an unknown unit.
pub fn parse_duration(input: &str) -> Result<Duration, CodecError> {
    let fail = || CodecError::UnparsableDuration {
        input: input.to_owned(),
    };
    if input.is_empty() {
        return Err(fail());
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|ch: char| !ch.is_ascii_digit())
            .ok_or_else(fail)?;
        if digits_end == 0 {
            return Err(fail());
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().map_err(|_| fail())?;
        let (unit, remainder) = if let Some(after) = tail.strip_prefix("ms") {
            ("ms", after)
        } else if let Some(after) = tail.strip_prefix('h') {
            ("h", after)
        } else if let Some(after) = tail.strip_prefix('m') {
            ("m", after)
        } else if let Some(after) = tail.strip_prefix('s') {
            ("s", after)
        } else {
            return Err(fail());
        };
        total += match unit {
            "h" => Duration::from_secs(value * 3600),
            "m" => Duration::from_secs(value * 60),
            "s" => Duration::from_secs(value),
            _ => Duration::from_millis(value),
        };
        rest = remainder;
    }
    Ok(total)
}

/// Renders a duration in its canonical form: the largest unit that divides
/// it exactly (`90s` stays `90s`, `60s` becomes `1m`, `3600s` becomes `1h`).
#[must_use]
pub fn render_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return String::from("0s");
    }
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Returns true when two duration strings denote the same span. Used for
/// diff suppression so `"60s"` against `"1m"` produces no change.
#[must_use]
pub fn durations_equivalent(a: &str, b: &str) -> bool {
    match (parse_duration(a), parse_duration(b)) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => a == b,
    }
}

/// Expands a bare IP to its single-host subnet and an empty string to the
/// catch-all subnet the API requires.
///
/// `"1.2.3.4"` becomes `"1.2.3.4/32"`, an IPv6 address gains `/128`, and
/// `""` becomes `"0.0.0.0/0"`. Already-qualified CIDRs pass through after
/// validation.
///
/// # Errors
///
/// Returns [`CodecError::MalformedCidr`] when the value is neither an IP nor
/// a valid CIDR.
pub fn expand_ip_to_cidr(input: &str) -> Result<String, CodecError> {
    if input.is_empty() {
        return Ok(String::from("0.0.0.0/0"));
    }
    if let Some((addr, prefix)) = input.split_once('/') {
        let ip = IpAddr::from_str(addr).map_err(|err| CodecError::MalformedCidr {
            input: input.to_owned(),
            reason: err.to_string(),
        })?;
        let max_prefix: u8 = if ip.is_ipv4() { 32 } else { 128 };
        let bits: u8 = prefix.parse().map_err(|_| CodecError::MalformedCidr {
            input: input.to_owned(),
            reason: format!("invalid prefix length {prefix}"),
        })?;
        if bits > max_prefix {
            return Err(CodecError::MalformedCidr {
                input: input.to_owned(),
                reason: format!("prefix length {bits} exceeds {max_prefix}"),
            });
        }
        return Ok(input.to_owned());
    }
    let ip = IpAddr::from_str(input).map_err(|err| CodecError::MalformedCidr {
        input: input.to_owned(),
        reason: err.to_string(),
    })?;
    if ip.is_ipv4() {
        Ok(format!("{ip}/32"))
    } else {
        Ok(format!("{ip}/128"))
    }
}

/// Returns true when two IP or CIDR strings denote the same subnet once
/// expanded, so `"1.2.3.4"` against `"1.2.3.4/32"` produces no change.
#[must_use]
pub fn cidrs_equivalent(a: &str, b: &str) -> bool {
    match (expand_ip_to_cidr(a), expand_ip_to_cidr(b)) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => a == b,
    }
}

/// An inclusive port range. `None` on both ends means "any port".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PortRange {
    /// First port of the range, when bounded.
    pub from: Option<u16>,
    /// Last port of the range, when bounded.
    pub to: Option<u16>,
}

impl PortRange {
    /// Parses `"80"`, `"80-443"`, or the empty string (any port).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidPort`] when either end is absent from
    /// `0..=65535`.
    pub fn parse(input: &str) -> Result<Self, CodecError> {
        if input.is_empty() {
            return Ok(Self::default());
        }
        let (from_text, to_text) = input
            .split_once('-')
            .map_or((input, input), |(lhs, rhs)| (lhs, rhs));
        let from = parse_port(from_text, "from")?;
        let to = parse_port(to_text, "to")?;
        Ok(Self {
            from: Some(from),
            to: Some(to),
        })
    }

    /// Renders the engine-facing form: `""` for any, `"80"` for single
    /// ports, `"80-443"` otherwise.
    #[must_use]
    pub fn render(self) -> String {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from == to => from.to_string(),
            (Some(from), Some(to)) => format!("{from}-{to}"),
            (Some(port), None) | (None, Some(port)) => port.to_string(),
            (None, None) => String::new(),
        }
    }

    /// Returns the wire fields: when `from == to` only `from` is sent, and a
    /// fully-unbounded range omits both (meaning "any port").
    #[must_use]
    pub fn wire_fields(self) -> (Option<u16>, Option<u16>) {
        match (self.from, self.to) {
            (Some(0), Some(0)) | (None, None) => (None, None),
            (Some(from), Some(to)) if from == to => (Some(from), None),
            other => other,
        }
    }
}

fn parse_port(text: &str, end: &'static str) -> Result<u16, CodecError> {
    text.parse::<u16>().map_err(|_| CodecError::InvalidPort {
        end,
        value: text.to_owned(),
    })
}

/// Renders an optional timestamp as RFC 3339, or the empty string when
/// unset.
#[must_use]
pub fn render_timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(String::new, |ts| {
        ts.to_rfc3339_opts(SecondsFormat::Secs, true)
    })
}

/// Parses an RFC 3339 timestamp; the empty string decodes to `None`.
///
/// # Errors
///
/// Returns [`CodecError::MalformedTimestamp`] when a non-empty value fails
/// to parse.
pub fn parse_timestamp(input: &str) -> Result<Option<DateTime<Utc>>, CodecError> {
    if input.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(input)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|err| CodecError::MalformedTimestamp {
            input: input.to_owned(),
            reason: err.to_string(),
        })
}

/// Returns true when two tag lists carry the same tags, tolerating remote
/// reordering. The configured order is what gets stored; only membership is
/// compared.
#[must_use]
pub fn tags_equivalent(declared: &[String], remote: &[String]) -> bool {
    let mut lhs = declared.to_vec();
    let mut rhs = remote.to_vec();
    lhs.sort_unstable();
    rhs.sort_unstable();
    lhs == rhs
}

#[cfg(test)]
mod tests;
