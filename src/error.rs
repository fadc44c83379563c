use thiserror::Error;

/// An invalid configuration for a map.
///
/// Configuration is checked once, at construction. No operation on a constructed map
/// can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A sharded map needs at least one shard.
    #[error("invalid shard count {0}, a sharded map needs at least one shard")]
    InvalidShardCount(usize),

    /// The requested capacity cannot be allocated.
    #[error("capacity overflow")]
    CapacityOverflow,
}
