//! Matchmaking configuration.

use turnrelay_registry::DEFAULT_CAPACITY;

// ---------------------------------------------------------------------------
// OrphanPolicy
// ---------------------------------------------------------------------------

/// What happens to the waiting record when its connection goes away
/// before an opponent shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Keep the slot as `Orphaned`. A later `<id>:RECONNECT` puts it back
    /// into matchmaking under the same id.
    #[default]
    Retain,

    /// Free the slot immediately.
    Release,
}

// ---------------------------------------------------------------------------
// MatchConfig
// ---------------------------------------------------------------------------

/// Settings for a [`Matchmaker`](crate::Matchmaker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    /// Registry slots, including the reserved slot 0.
    pub capacity: u32,

    pub orphan_policy: OrphanPolicy,

    /// Queue an `END` record for the survivor when its opponent
    /// terminates.
    pub notify_on_end: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            orphan_policy: OrphanPolicy::Retain,
            notify_on_end: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_config_default() {
        let config = MatchConfig::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.orphan_policy, OrphanPolicy::Retain);
        assert!(!config.notify_on_end);
    }
}
