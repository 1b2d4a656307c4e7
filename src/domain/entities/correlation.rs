//! Correlation ids pair a request with its response.
//!
//! An id has the shape `<namespace>.<action>.<sequence>` and every hop bumps
//! the sequence by one, leaving the other two segments untouched.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Correlation id not transmitted")]
    Missing,

    #[error("Invalid correlation id: {0}")]
    Invalid(String),
}

/// A parsed `<namespace>.<action>.<sequence>` token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId {
    namespace: String,
    action: String,
    sequence: u64,
}

impl CorrelationId {
    pub fn new(namespace: impl Into<String>, action: impl Into<String>, sequence: u64) -> Self {
        Self {
            namespace: namespace.into(),
            action: action.into(),
            sequence,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CorrelationError> {
        if raw.trim().is_empty() {
            return Err(CorrelationError::Missing);
        }

        let invalid = || CorrelationError::Invalid(raw.to_string());
        let parts: Vec<&str> = raw.split('.').collect();
        let [namespace, action, sequence] = parts.as_slice() else {
            return Err(invalid());
        };

        if namespace.is_empty() || action.is_empty() {
            return Err(invalid());
        }
        // u64::from_str would also take a leading '+'
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence = sequence.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self::new(*namespace, *action, sequence))
    }

    /// The id of the next hop
    pub fn next(&self) -> Result<Self, CorrelationError> {
        let sequence = self
            .sequence
            .checked_add(1)
            .ok_or_else(|| CorrelationError::Invalid(self.to_string()))?;
        Ok(Self::new(self.namespace.clone(), self.action.clone(), sequence))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl FromStr for CorrelationId {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.action, self.sequence)
    }
}

/// Increment a raw id, reporting why when that is impossible
pub fn try_increment(raw: &str) -> Result<String, CorrelationError> {
    Ok(CorrelationId::parse(raw)?.next()?.to_string())
}

/// Increment a raw id. Never fails: a malformed or missing id comes back as a
/// diagnostic string so a response envelope can still be emitted.
pub fn increment(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => try_increment(raw).unwrap_or_else(|e| e.to_string()),
        None => CorrelationError::Missing.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_bumps_sequence() {
        assert_eq!(increment(Some("auth.register.1")), "auth.register.2");
        assert_eq!(increment(Some("payment.status.3")), "payment.status.4");
        assert_eq!(increment(Some("payment.init.0")), "payment.init.1");
        assert_eq!(increment(Some("a.b.99")), "a.b.100");
    }

    #[test]
    fn test_increment_keeps_namespace_and_action() {
        let next = CorrelationId::parse("shop.checkout.41").unwrap().next().unwrap();
        assert_eq!(next.namespace(), "shop");
        assert_eq!(next.action(), "checkout");
        assert_eq!(next.sequence(), 42);
    }

    #[test]
    fn test_non_numeric_sequence_is_reported() {
        assert_eq!(
            increment(Some("auth.register.N")),
            "Invalid correlation id: auth.register.N"
        );
        assert!(increment(Some("auth.register.-1")).starts_with("Invalid"));
        assert!(increment(Some("auth.register.+1")).starts_with("Invalid"));
    }

    #[test]
    fn test_missing_segment_is_reported() {
        assert_eq!(increment(Some("auth.1")), "Invalid correlation id: auth.1");
        assert_eq!(increment(Some("auth")), "Invalid correlation id: auth");
        assert!(increment(Some(".register.1")).starts_with("Invalid"));
    }

    #[test]
    fn test_extra_segment_is_rejected() {
        assert!(try_increment("auth.register.1.2").is_err());
    }

    #[test]
    fn test_missing_id_is_reported() {
        assert_eq!(increment(None), "Correlation id not transmitted");
        assert_eq!(increment(Some("")), "Correlation id not transmitted");
    }

    #[test]
    fn test_sequence_overflow_is_reported() {
        let raw = format!("a.b.{}", u64::MAX);
        assert_eq!(try_increment(&raw), Err(CorrelationError::Invalid(raw.clone())));
    }
}
