//! Pong cache tuning.

/// Thresholds for [`PongCacher`](crate::PongCacher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PongCacheConfig {
    /// Pongs kept per hop count.
    pub pongs_per_hop: usize,
    /// Hop buckets per locale; pongs with more hops are not cached.
    pub hop_buckets: u8,
    /// Lifetime of pongs in the default locale.
    pub expiry_ms: u64,
    /// Lifetime multiplier for other locales, which are rarer.
    pub foreign_expiry_factor: u64,
    pub default_locale: String,
}

impl Default for PongCacheConfig {
    fn default() -> Self {
        Self {
            pongs_per_hop: 1,
            hop_buckets: 6,
            expiry_ms: 6_000,
            foreign_expiry_factor: 15,
            default_locale: "en".to_string(),
        }
    }
}

impl PongCacheConfig {
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// How long a pong of `locale` stays usable.
    pub fn expiry_for(&self, locale: &str) -> u64 {
        if locale == self.default_locale {
            self.expiry_ms
        } else {
            self.expiry_ms.saturating_mul(self.foreign_expiry_factor)
        }
    }
}
