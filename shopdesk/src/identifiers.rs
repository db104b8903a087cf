use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Chat-platform user handle.
///
/// Stable for the lifetime of the chat account, and used as the primary key for stored
/// credentials and for in-progress conversation state.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Identity(pub i64);

impl FromStr for Identity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Identity)
            .map_err(|_| anyhow!("not a valid identity (expected an integer): {}", s))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Identity {
    fn from(v: i64) -> Self {
        Identity(v)
    }
}

#[test]
fn test_identity() {
    assert_eq!(Identity::from_str("42").unwrap(), Identity(42));
    assert_eq!(Identity::from_str(" 42 ").unwrap(), Identity(42));
    // group chats have negative ids
    assert_eq!(
        Identity::from_str("-1001234567890").unwrap(),
        Identity(-1001234567890)
    );
    assert_eq!(Identity(7).to_string(), "7");

    assert!(Identity::from_str("").is_err());
    assert!(Identity::from_str("abc").is_err());
    assert!(Identity::from_str("4.2").is_err());
}
