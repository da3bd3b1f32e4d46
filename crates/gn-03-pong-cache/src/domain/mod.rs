mod bucket;
mod config;

pub(crate) use bucket::HopBuckets;
pub use bucket::CachedPong;
pub use config::*;
