use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of event stream an aggregate is computed from.
///
/// Variants correspond to:
/// - Blockchain : on-chain transactions (one stream per run)
/// - Exchange   : trades of one named exchange (any number of streams)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Blockchain,
    Exchange,
}

impl SourceKind {
    /// Return the short code string for the source kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Blockchain => "blockchain",
            SourceKind::Exchange => "exchange",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
