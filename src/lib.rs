#![doc = include_str!("../README.md")]

mod error;
mod hash;
mod map;
mod raw;
mod sharded;

pub use error::ConfigError;
pub use hash::SeededState;
pub use map::{Iter, Keys, SwissMap, SwissMapBuilder, Values};
pub use raw::{Capabilities, MatchMode, GROUP_WIDTH, MAX_LOAD};
pub use sharded::{ShardedMap, ShardedMapBuilder};
