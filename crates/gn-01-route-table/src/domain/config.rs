//! Route table configuration.

/// Default capacity across both generations.
pub const DEFAULT_MAX_ROUTES: usize = 50_000;

/// Route table configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTableConfig {
    /// Length of one generation window in milliseconds.
    pub window_ms: u64,
    /// Hard bound on routes held across both generations.
    pub max_size: usize,
}

impl RouteTableConfig {
    pub fn new(window_ms: u64, max_size: usize) -> Self {
        Self {
            window_ms,
            max_size: max_size.max(1),
        }
    }

    /// Routes for pongs back to pingers.
    pub fn ping() -> Self {
        Self::new(2 * 60 * 1000, DEFAULT_MAX_ROUTES)
    }

    /// Routes for query hits back to searchers.
    pub fn query() -> Self {
        Self::new(5 * 60 * 1000, DEFAULT_MAX_ROUTES)
    }

    /// Routes for pushes towards firewalled hosts.
    pub fn push() -> Self {
        Self::new(7 * 60 * 1000, DEFAULT_MAX_ROUTES)
    }

    /// Short windows for tests.
    pub fn for_testing() -> Self {
        Self::new(1_000, 100)
    }
}

impl Default for RouteTableConfig {
    fn default() -> Self {
        Self::query()
    }
}
