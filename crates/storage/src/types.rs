//! Common types used across storage operations.

use std::time::Duration;

/// Expiration state of a single key, as reported by
/// [`KeyValueStore::ttl`](crate::KeyValueStore::ttl).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use multitoken_storage::KeyTtl;
///
/// let ttl = KeyTtl::Expires(Duration::from_secs(30));
/// assert!(ttl.exists());
/// assert_eq!(ttl.remaining(), Some(Duration::from_secs(30)));
///
/// assert!(!KeyTtl::Absent.exists());
/// assert_eq!(KeyTtl::Persistent.remaining(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTtl {
    /// The key does not exist (never written, deleted, or already expired).
    Absent,
    /// The key exists and never expires.
    Persistent,
    /// The key exists and expires after the contained remaining duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Returns `true` unless the key is [`Absent`](Self::Absent).
    #[must_use]
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns `true` if the key exists and carries an expiration.
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        matches!(self, Self::Expires(_))
    }

    /// Remaining lifetime, if the key exists and expires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expires(remaining) => Some(*remaining),
            Self::Absent | Self::Persistent => None,
        }
    }
}

impl std::fmt::Display for KeyTtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Persistent => write!(f, "persistent"),
            Self::Expires(remaining) => write!(f, "expires in {}ms", remaining.as_millis()),
        }
    }
}
