mod group;
mod probe;
mod table;
mod utils;

#[cfg(target_arch = "x86_64")]
mod x86_64;

pub use group::{Capabilities, MatchMode, GROUP_WIDTH, MAX_LOAD};
pub use table::{groups_for, Iter, Table};
pub use utils::{available_parallelism, CachePadded};
