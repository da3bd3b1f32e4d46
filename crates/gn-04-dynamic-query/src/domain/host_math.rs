//! Reach estimates for a query sent with a given TTL.

/// Hosts a query reaches through one link of `degree` ultrapeer connections.
///
/// Sum over hops of `(degree - 1)^(hop - 1)`.
pub fn hosts_reached(degree: u32, ttl: u8) -> u64 {
    let fanout = degree as f64 - 1.0;
    let hosts: f64 = (1..=ttl).map(|t| fanout.powi(t as i32 - 1)).sum();
    if hosts <= 0.0 {
        0
    } else {
        hosts as u64
    }
}

/// Smallest TTL whose reach, times sixteen, covers `hosts_per_connection`.
///
/// Capped by the link's `max_ttl` and by `ceiling`; never below 1.
pub fn calculate_ttl(hosts_per_connection: u64, degree: u32, max_ttl: u8, ceiling: u8) -> u8 {
    let max_ttl = max_ttl.min(ceiling).max(1);
    for ttl in 1..ceiling {
        if 16 * hosts_reached(degree, ttl) >= hosts_per_connection {
            return ttl.min(max_ttl);
        }
    }
    max_ttl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_reached() {
        assert_eq!(hosts_reached(6, 1), 1);
        assert_eq!(hosts_reached(6, 2), 6);
        assert_eq!(hosts_reached(6, 3), 31);
        assert_eq!(hosts_reached(32, 3), 1 + 31 + 961);
    }

    #[test]
    fn test_small_needs_get_ttl_one() {
        assert_eq!(calculate_ttl(16, 32, 4, 6), 1);
        assert_eq!(calculate_ttl(0, 32, 4, 6), 1);
    }

    #[test]
    fn test_ttl_grows_with_hosts_needed() {
        // 16 * (1 + 31) = 512 covers 500 at TTL 2.
        assert_eq!(calculate_ttl(500, 32, 4, 6), 2);
        // 16 * (1 + 31 + 961) = 15 888 covers 10 000 at TTL 3.
        assert_eq!(calculate_ttl(10_000, 32, 4, 6), 3);
    }

    #[test]
    fn test_ttl_capped_by_link() {
        assert_eq!(calculate_ttl(10_000, 32, 2, 6), 2);
        assert_eq!(calculate_ttl(u64::MAX, 32, 9, 6), 6);
        assert_eq!(calculate_ttl(10_000, 32, 0, 6), 1);
    }
}
