// Core types and limits shared by every slogd component
use std::fmt;
use std::str::FromStr;

/// Conventional path of the local syslog socket.
pub const DEFAULT_SOCKET_PATH: &str = "/dev/log";

/// Largest datagram accepted; anything past this is discarded by the kernel.
pub const MAX_DATAGRAM_LEN: usize = 400;

/// Number of space-separated header fields in front of the payload.
pub const HEADER_SEPARATORS: usize = 3;

/// Longest payload written to sinks, stored in the table or reported.
pub const MAX_OUTPUT_LEN: usize = MAX_DATAGRAM_LEN - HEADER_SEPARATORS;

/// Number of buckets in the frequency table unless configured otherwise.
pub const DEFAULT_TABLE_CAPACITY: usize = 999;

/// How the frequency table treats two different messages landing in one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Counts merge into the bucket; the first message keeps naming it.
    #[default]
    Faithful,
    /// Messages are compared and probed into free buckets (linear probing).
    /// Falls back to merging once every bucket holds something else.
    Separate,
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CollisionPolicy::Faithful => write!(f, "faithful"),
            CollisionPolicy::Separate => write!(f, "separate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collision policy {0:?}, expected \"faithful\" or \"separate\"")]
pub struct ParseCollisionPolicyError(pub String);

impl FromStr for CollisionPolicy {
    type Err = ParseCollisionPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faithful" | "merge" => Ok(CollisionPolicy::Faithful),
            "separate" | "safe" => Ok(CollisionPolicy::Separate),
            _ => Err(ParseCollisionPolicyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_limit_leaves_room_for_separators() {
        assert_eq!(MAX_OUTPUT_LEN, 397);
    }

    #[test]
    fn collision_policy_parses_aliases() {
        assert_eq!("faithful".parse::<CollisionPolicy>(), Ok(CollisionPolicy::Faithful));
        assert_eq!(" Safe ".parse::<CollisionPolicy>(), Ok(CollisionPolicy::Separate));
        assert_eq!("separate".parse::<CollisionPolicy>(), Ok(CollisionPolicy::Separate));
        assert!("chaining".parse::<CollisionPolicy>().is_err());
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::Faithful);
    }

    #[test]
    fn collision_policy_display_round_trips() {
        for policy in [CollisionPolicy::Faithful, CollisionPolicy::Separate] {
            assert_eq!(policy.to_string().parse::<CollisionPolicy>(), Ok(policy));
        }
    }
}
