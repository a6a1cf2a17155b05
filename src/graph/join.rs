// src/graph/join.rs

use std::fmt;

use serde::{Deserialize, Deserializer};

/// How many incoming transitions a task waits for before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Every satisfied inbound transition enters the task independently.
    #[default]
    None,
    /// Wait for every inbound transition.
    All,
    /// Wait for this many inbound transitions.
    Count(usize),
}

impl JoinPolicy {
    pub fn is_join(&self) -> bool {
        !matches!(self, JoinPolicy::None)
    }

    /// Number of arrivals needed to fire, given the task's inbound degree.
    pub fn required(&self, inbound: usize) -> usize {
        match self {
            JoinPolicy::None => 1,
            JoinPolicy::All => inbound.max(1),
            JoinPolicy::Count(n) => (*n).clamp(1, inbound.max(1)),
        }
    }
}

impl fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPolicy::None => f.write_str("none"),
            JoinPolicy::All => f.write_str("all"),
            JoinPolicy::Count(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawJoin {
    Count(usize),
    Keyword(String),
}

impl<'de> Deserialize<'de> for JoinPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawJoin::deserialize(deserializer)? {
            RawJoin::Count(n) => Ok(JoinPolicy::Count(n)),
            RawJoin::Keyword(s) => match s.trim().to_lowercase().as_str() {
                "all" => Ok(JoinPolicy::All),
                "none" => Ok(JoinPolicy::None),
                other => other.parse::<usize>().map(JoinPolicy::Count).map_err(|_| {
                    serde::de::Error::custom(format!(
                        "invalid join: {other} (expected \"all\", \"none\" or a count)"
                    ))
                }),
            },
        }
    }
}
