//! Structural node kinds.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The structural type of a stored node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Something is stored under the node but its kind cannot be determined.
    Invalid,
    /// Nothing is stored.
    Nil,
    /// The node's own key holds a value.
    Scalar,
    Sequence,
    Map,
}

impl Kind {
    /// The persisted spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Invalid => "invalid",
            Kind::Nil => "nil",
            Kind::Scalar => "scalar",
            Kind::Sequence => "sequence",
            Kind::Map => "map",
        }
    }

    /// Whether a node of this kind may be overwritten with a value of `incoming` kind.
    pub fn accepts(&self, incoming: Kind) -> bool {
        *self == Kind::Nil || *self == incoming
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized persisted kind text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown kind {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(Kind::Invalid),
            "nil" => Ok(Kind::Nil),
            "scalar" => Ok(Kind::Scalar),
            "sequence" => Ok(Kind::Sequence),
            "map" => Ok(Kind::Map),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}
