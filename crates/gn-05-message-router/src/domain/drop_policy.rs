//! Query reply drop policy.

use super::config::RouterConfig;
use gn_01_route_table::ReplyRoutePair;
use shared_types::HandlerKind;

/// Whether a query reply bound for `route` should be dropped.
///
/// `ttl` is the reply's TTL after hopping. Replies for this node are never
/// dropped. Otherwise a reply dies when it cannot travel further, when the
/// query already drew enough results, or when the query has used up the
/// byte budget for its distance.
pub fn should_drop_reply(route: &ReplyRoutePair, ttl: u8, config: &RouterConfig) -> bool {
    if route.handler.kind() == HandlerKind::Local {
        return false;
    }
    if ttl == 0 || route.results_routed > config.max_routed_results {
        return true;
    }
    let budget = match ttl {
        1 => config.reply_budget_ttl1,
        2 => config.reply_budget_ttl2,
        _ => config.reply_budget_far,
    };
    route.bytes_routed >= budget
}
