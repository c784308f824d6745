use serde::{Serialize, Serializer};
use std::fmt;

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Client is on the block list.
    Blocked,
    /// Client was just blocked for abusive request patterns.
    Suspicious,
    /// Client exceeded one of its sliding-window quotas.
    RateLimited,
    /// The admission queue is at capacity.
    QueueFull,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Blocked => "IP blocked",
            RejectReason::Suspicious => "Suspicious activity detected",
            RejectReason::RateLimited => "rate limit exceeded",
            RejectReason::QueueFull => "queue full",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission attempt.
///
/// Serializes as `{"admitted": bool, "reason": string}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Queued,
    Rejected(RejectReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Queued)
    }

    /// Human-readable reason, `"queued"` on success.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionDecision::Queued => "queued",
            AdmissionDecision::Rejected(reason) => reason.as_str(),
        }
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            AdmissionDecision::Queued => None,
            AdmissionDecision::Rejected(reason) => Some(*reason),
        }
    }

    /// The `(admitted, reason)` pair handed back to HTTP collaborators.
    pub fn into_parts(self) -> (bool, &'static str) {
        (self.is_admitted(), self.reason())
    }
}

impl From<RejectReason> for AdmissionDecision {
    fn from(reason: RejectReason) -> Self {
        AdmissionDecision::Rejected(reason)
    }
}

impl Serialize for AdmissionDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("AdmissionDecision", 2)?;
        state.serialize_field("admitted", &self.is_admitted())?;
        state.serialize_field("reason", self.reason())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(AdmissionDecision::Queued.into_parts(), (true, "queued"));
        assert_eq!(
            AdmissionDecision::from(RejectReason::QueueFull).into_parts(),
            (false, "queue full")
        );
        assert_eq!(
            AdmissionDecision::Rejected(RejectReason::RateLimited).reason(),
            "rate limit exceeded"
        );
    }

    #[test]
    fn test_serializes_as_pair() {
        let json = serde_json::to_value(AdmissionDecision::Rejected(RejectReason::Blocked)).unwrap();
        assert_eq!(json, serde_json::json!({ "admitted": false, "reason": "IP blocked" }));
    }
}
