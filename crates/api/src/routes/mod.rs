mod extract;
mod health;
mod shard;

pub use extract::{extract_router, render_result};
pub use health::health_router;
pub use shard::shard_router;
