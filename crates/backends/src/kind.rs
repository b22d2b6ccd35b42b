//! Backend discriminator.

use serde::{Deserialize, Serialize};

/// The four storage systems participating in a document operation.
///
/// The relational backend is the system of record and is mandatory;
/// the other three are optional and fall under the skip policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Vector,
    Graph,
    Relational,
    FileStorage,
}

impl BackendKind {
    /// All backends, in the canonical saga step order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Vector,
        BackendKind::Graph,
        BackendKind::Relational,
        BackendKind::FileStorage,
    ];

    /// Returns the backend name as used in logs and result maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Vector => "vector",
            BackendKind::Graph => "graph",
            BackendKind::Relational => "relational",
            BackendKind::FileStorage => "file_storage",
        }
    }

    /// Returns true for the mandatory system-of-record backend.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, BackendKind::Relational)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_relational_is_mandatory() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.is_mandatory(), kind == BackendKind::Relational);
        }
    }

    #[test]
    fn serializes_to_snake_case() {
        let json = serde_json::to_string(&BackendKind::FileStorage).unwrap();
        assert_eq!(json, "\"file_storage\"");
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(BackendKind::Vector.to_string(), "vector");
        assert_eq!(BackendKind::Graph.to_string(), "graph");
    }
}
