//! Order-group inference.
//!
//! The API accepts one dish per order, so a multi-dish checkout arrives as
//! several orders from the same customer a few seconds apart. This module
//! clusters such orders and caches the clusters in the local store under
//! `order_group_<primaryOrderId>`.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::{self, DbState};
use crate::models::OrderSummary;

pub const DEFAULT_GROUP_WINDOW_MS: i64 = 10_000;
pub const GROUP_CACHE_CATEGORY: &str = "order_group";
/// Cache entries older than this are pruned (30 days).
pub const GROUP_CACHE_MAX_AGE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Each unprocessed order collects the unprocessed orders within the
    /// window of itself only. Chains longer than the window split.
    Anchor,
    /// Union of the "same customer and within window" relation; chains merge.
    #[default]
    Transitive,
}

impl GroupingMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anchor" => Some(Self::Anchor),
            "transitive" => Some(Self::Transitive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anchor => "anchor",
            Self::Transitive => "transitive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderGroup {
    pub primary_order_id: i64,
    /// Members in ascending `created_at` order; the primary is first.
    pub member_order_ids: Vec<i64>,
}

impl OrderGroup {
    pub fn singleton(order_id: i64) -> Self {
        Self {
            primary_order_id: order_id,
            member_order_ids: vec![order_id],
        }
    }

    pub fn size(&self) -> usize {
        self.member_order_ids.len()
    }

    pub fn contains(&self, order_id: i64) -> bool {
        self.member_order_ids.contains(&order_id)
    }
}

/// Orders sorted by `created_at` ascending, ties by id. Orders whose
/// timestamp cannot be parsed sort last and never join a group.
fn sorted_with_times(orders: &[OrderSummary]) -> Vec<(&OrderSummary, Option<i64>)> {
    let mut sorted: Vec<(&OrderSummary, Option<i64>)> =
        orders.iter().map(|o| (o, o.created_at_ms())).collect();
    sorted.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.0.id.cmp(&b.0.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.0.id.cmp(&b.0.id),
    });
    for (order, ts) in &sorted {
        if ts.is_none() {
            warn!(
                order_id = order.id,
                created_at = %order.created_at,
                "unparseable order timestamp"
            );
        }
    }
    sorted
}

fn within_window(a: Option<i64>, b: Option<i64>, window_ms: i64) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => (x - y).abs() <= window_ms,
        _ => false,
    }
}

/// Cluster `orders` into groups. Every order appears in exactly one group.
/// Groups are returned in ascending order of their primary's `created_at`.
pub fn detect_groups(
    orders: &[OrderSummary],
    window_ms: i64,
    mode: GroupingMode,
) -> Vec<OrderGroup> {
    let sorted = sorted_with_times(orders);
    let groups = match mode {
        GroupingMode::Anchor => anchor_groups(&sorted, window_ms),
        GroupingMode::Transitive => transitive_groups(&sorted, window_ms),
    };
    debug!(
        orders = orders.len(),
        groups = groups.len(),
        mode = mode.as_str(),
        "order groups detected"
    );
    groups
}

fn anchor_groups(sorted: &[(&OrderSummary, Option<i64>)], window_ms: i64) -> Vec<OrderGroup> {
    let mut processed = vec![false; sorted.len()];
    let mut groups = Vec::new();

    for i in 0..sorted.len() {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let (anchor, anchor_ts) = sorted[i];
        let mut members = vec![anchor.id];

        for j in (i + 1)..sorted.len() {
            if processed[j] {
                continue;
            }
            let (other, other_ts) = sorted[j];
            if other.customer_id == anchor.customer_id
                && within_window(anchor_ts, other_ts, window_ms)
            {
                processed[j] = true;
                members.push(other.id);
            }
        }

        groups.push(OrderGroup {
            primary_order_id: anchor.id,
            member_order_ids: members,
        });
    }

    groups
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Keep the earlier index as root so the root is the primary.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

fn transitive_groups(sorted: &[(&OrderSummary, Option<i64>)], window_ms: i64) -> Vec<OrderGroup> {
    let mut parent: Vec<usize> = (0..sorted.len()).collect();

    // Within one customer the list is time-sorted, so linking each order to
    // its predecessor when within the window yields the full closure.
    let mut last_by_customer: HashMap<i64, usize> = HashMap::new();
    for (idx, (order, ts)) in sorted.iter().enumerate() {
        if ts.is_none() {
            continue;
        }
        if let Some(&prev) = last_by_customer.get(&order.customer_id) {
            if within_window(sorted[prev].1, *ts, window_ms) {
                union(&mut parent, prev, idx);
            }
        }
        last_by_customer.insert(order.customer_id, idx);
    }

    let mut by_root: HashMap<usize, Vec<i64>> = HashMap::new();
    let mut roots_in_order = Vec::new();
    for idx in 0..sorted.len() {
        let root = find(&mut parent, idx);
        let entry = by_root.entry(root).or_default();
        if entry.is_empty() {
            roots_in_order.push(root);
        }
        entry.push(sorted[idx].0.id);
    }

    roots_in_order
        .into_iter()
        .filter_map(|root| by_root.remove(&root))
        .map(|members| OrderGroup {
            primary_order_id: members[0],
            member_order_ids: members,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Local cache
// ---------------------------------------------------------------------------

/// Stored shape of a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedGroup {
    pub order_ids: Vec<i64>,
    /// Unix milliseconds when the entry was written.
    pub timestamp: i64,
}

pub fn cache_key(primary_order_id: i64) -> String {
    format!("order_group_{primary_order_id}")
}

/// Best-effort cache of group memberships. Entries are hints: readers
/// validate them against the current order list before use.
pub struct GroupCache<'a> {
    store: &'a DbState,
}

impl<'a> GroupCache<'a> {
    pub fn new(store: &'a DbState) -> Self {
        Self { store }
    }

    pub fn put(&self, group: &OrderGroup) -> Result<(), String> {
        self.put_at(group, Utc::now().timestamp_millis())
    }

    fn put_at(&self, group: &OrderGroup, timestamp: i64) -> Result<(), String> {
        let entry = CachedGroup {
            order_ids: group.member_order_ids.clone(),
            timestamp,
        };
        let value = serde_json::to_value(&entry).map_err(|e| e.to_string())?;
        db::write_json(
            self.store,
            GROUP_CACHE_CATEGORY,
            &cache_key(group.primary_order_id),
            &value,
        )
    }

    pub fn remove(&self, primary_order_id: i64) -> Result<(), String> {
        let conn = self.store.conn.lock().map_err(|e| e.to_string())?;
        db::delete_setting(&conn, GROUP_CACHE_CATEGORY, &cache_key(primary_order_id))
    }

    /// Raw `(key, parsed entry)` pairs. Unreadable entries parse as `None`.
    fn raw_entries(&self) -> Vec<(String, Option<(i64, CachedGroup)>)> {
        let entries = match self.store.conn.lock() {
            Ok(conn) => db::list_settings(&conn, GROUP_CACHE_CATEGORY).unwrap_or_default(),
            Err(_) => return Vec::new(),
        };
        entries
            .into_iter()
            .map(|(key, raw)| {
                let parsed = key
                    .strip_prefix("order_group_")
                    .and_then(|id| id.parse::<i64>().ok())
                    .zip(serde_json::from_str::<CachedGroup>(&raw).ok())
                    .filter(|(_, entry)| !entry.order_ids.is_empty());
                (key, parsed)
            })
            .collect()
    }

    /// Every readable entry with its write time, ordered by primary id.
    pub fn entries(&self) -> Vec<(OrderGroup, i64)> {
        let mut out: Vec<(OrderGroup, i64)> = self
            .raw_entries()
            .into_iter()
            .filter_map(|(_, parsed)| parsed)
            .map(|(primary, entry)| {
                (
                    OrderGroup {
                        primary_order_id: primary,
                        member_order_ids: entry.order_ids,
                    },
                    entry.timestamp,
                )
            })
            .collect();
        out.sort_by_key(|(g, _)| g.primary_order_id);
        out
    }

    /// Cached groups containing `order_id`, newest first.
    fn containing(&self, order_id: i64) -> Vec<OrderGroup> {
        let mut hits: Vec<(OrderGroup, i64)> = self
            .entries()
            .into_iter()
            .filter(|(g, _)| g.contains(order_id))
            .collect();
        hits.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then(b.0.primary_order_id.cmp(&a.0.primary_order_id))
        });
        hits.into_iter().map(|(g, _)| g).collect()
    }

    /// Persist every multi-member group. Singletons are not cached. Older
    /// entries that share orders with a new group but disagree on its
    /// membership are dropped.
    pub fn remember_all(&self, groups: &[OrderGroup]) {
        let existing = self.entries();
        for group in groups.iter().filter(|g| g.size() > 1) {
            for (old, _) in &existing {
                let overlaps = old
                    .member_order_ids
                    .iter()
                    .any(|id| group.contains(*id));
                if overlaps && old != group {
                    debug!(primary = old.primary_order_id, "replacing cached order group");
                    if let Err(e) = self.remove(old.primary_order_id) {
                        warn!(
                            primary = old.primary_order_id,
                            error = %e,
                            "failed to drop cached order group"
                        );
                    }
                }
            }
            if let Err(e) = self.put(group) {
                warn!(primary = group.primary_order_id, error = %e, "failed to cache order group");
            }
        }
    }

    pub fn get(&self, primary_order_id: i64) -> Option<OrderGroup> {
        let value =
            db::read_json(self.store, GROUP_CACHE_CATEGORY, &cache_key(primary_order_id)).ok()?;
        let entry: CachedGroup = serde_json::from_value(value).ok()?;
        if entry.order_ids.is_empty() {
            return None;
        }
        Some(OrderGroup {
            primary_order_id,
            member_order_ids: entry.order_ids,
        })
    }

    /// The most recently written cached group containing `order_id`, as
    /// primary or member.
    pub fn find_containing(&self, order_id: i64) -> Option<OrderGroup> {
        self.containing(order_id).into_iter().next()
    }

    /// Drop entries written before `now_ms - max_age_ms` and unreadable
    /// entries. Returns how many were removed.
    pub fn prune_older_than(&self, max_age_ms: i64, now_ms: i64) -> Result<usize, String> {
        let cutoff = now_ms.saturating_sub(max_age_ms);
        let stale: Vec<String> = self
            .raw_entries()
            .into_iter()
            .filter(|(_, parsed)| match parsed {
                Some((_, entry)) => entry.timestamp < cutoff,
                None => true,
            })
            .map(|(key, _)| key)
            .collect();
        let conn = self.store.conn.lock().map_err(|e| e.to_string())?;
        for key in &stale {
            db::delete_setting(&conn, GROUP_CACHE_CATEGORY, key)?;
        }
        Ok(stale.len())
    }

    /// [`Self::prune_older_than`] with [`GROUP_CACHE_MAX_AGE_MS`], logging failures.
    pub fn prune_expired(&self) -> usize {
        match self.prune_older_than(GROUP_CACHE_MAX_AGE_MS, Utc::now().timestamp_millis()) {
            Ok(0) => 0,
            Ok(n) => {
                debug!(removed = n, "pruned expired order groups");
                n
            }
            Err(e) => {
                warn!(error = %e, "failed to prune order group cache");
                0
            }
        }
    }

    pub fn clear(&self) -> Result<(), String> {
        let conn = self.store.conn.lock().map_err(|e| e.to_string())?;
        db::delete_all_settings(&conn, GROUP_CACHE_CATEGORY)
    }
}

/// Resolve the group an order belongs to: the newest cached entry whose
/// members all still exist in `orders`, else fresh detection (which
/// refreshes the cache). Cached entries referencing unknown orders are
/// deleted on the way.
pub fn resolve_group(
    order_id: i64,
    orders: &[OrderSummary],
    cache: &GroupCache<'_>,
    window_ms: i64,
    mode: GroupingMode,
) -> OrderGroup {
    let known: HashSet<i64> = orders.iter().map(|o| o.id).collect();
    cache.prune_expired();

    for cached in cache.containing(order_id) {
        if cached.member_order_ids.iter().all(|id| known.contains(id)) {
            debug!(order_id, primary = cached.primary_order_id, "order group from cache");
            return cached;
        }
        warn!(
            order_id,
            primary = cached.primary_order_id,
            "cached order group references unknown orders; dropping it"
        );
        if let Err(e) = cache.remove(cached.primary_order_id) {
            warn!(
                primary = cached.primary_order_id,
                error = %e,
                "failed to drop stale order group"
            );
        }
    }

    let groups = detect_groups(orders, window_ms, mode);
    cache.remember_all(&groups);
    groups
        .into_iter()
        .find(|g| g.contains(order_id))
        .unwrap_or_else(|| OrderGroup::singleton(order_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = DEFAULT_GROUP_WINDOW_MS;

    fn order(id: i64, customer_id: i64, created_at: &str) -> OrderSummary {
        OrderSummary {
            id,
            customer_id,
            created_at: created_at.to_string(),
            dish_name: Some(format!("Dish {id}")),
            requested_quantity: 1.0,
            requested_unit: "kg".into(),
            ..OrderSummary::default()
        }
    }

    #[test]
    fn nine_seconds_apart_is_one_group() {
        let orders = vec![
            order(1, 7, "2025-03-01T10:00:00Z"),
            order(2, 7, "2025-03-01T10:00:09Z"),
        ];
        for mode in [GroupingMode::Anchor, GroupingMode::Transitive] {
            let groups = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, mode);
            assert_eq!(groups.len(), 1, "{mode:?}");
            assert_eq!(groups[0].primary_order_id, 1);
            assert_eq!(groups[0].member_order_ids, vec![1, 2]);
        }
    }

    #[test]
    fn ten_point_zero_zero_one_seconds_apart_is_two_groups() {
        let orders = vec![
            order(1, 7, "2025-03-01T10:00:00.000Z"),
            order(2, 7, "2025-03-01T10:00:10.001Z"),
        ];
        for mode in [GroupingMode::Anchor, GroupingMode::Transitive] {
            let groups = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, mode);
            assert_eq!(groups.len(), 2, "{mode:?}");
            assert!(groups.iter().all(|g| g.size() == 1));
        }
    }

    #[test]
    fn exactly_ten_seconds_is_inside_the_window() {
        let orders = vec![
            order(1, 7, "2025-03-01T10:00:00Z"),
            order(2, 7, "2025-03-01T10:00:10Z"),
        ];
        let groups = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, GroupingMode::Anchor);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn different_customers_never_group() {
        let orders = vec![
            order(1, 7, "2025-03-01T10:00:00Z"),
            order(2, 8, "2025-03-01T10:00:01Z"),
        ];
        let groups = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, GroupingMode::Transitive);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn chain_splits_in_anchor_mode_and_merges_in_transitive_mode() {
        // A-B 6s, B-C 6s, A-C 12s.
        let orders = vec![
            order(3, 7, "2025-03-01T10:00:12Z"),
            order(1, 7, "2025-03-01T10:00:00Z"),
            order(2, 7, "2025-03-01T10:00:06Z"),
        ];

        let anchor = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, GroupingMode::Anchor);
        assert_eq!(anchor.len(), 2);
        assert_eq!(anchor[0].member_order_ids, vec![1, 2]);
        assert_eq!(anchor[1].member_order_ids, vec![3]);

        let transitive = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, GroupingMode::Transitive);
        assert_eq!(transitive.len(), 1);
        assert_eq!(transitive[0].primary_order_id, 1);
        assert_eq!(transitive[0].member_order_ids, vec![1, 2, 3]);
    }

    #[test]
    fn interleaved_customers_group_independently() {
        let orders = vec![
            order(1, 7, "2025-03-01T10:00:00Z"),
            order(2, 8, "2025-03-01T10:00:01Z"),
            order(3, 7, "2025-03-01T10:00:02Z"),
            order(4, 8, "2025-03-01T10:00:30Z"),
        ];
        let groups = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, GroupingMode::Transitive);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].member_order_ids, vec![1, 3]);
        assert_eq!(groups[1].member_order_ids, vec![2]);
        assert_eq!(groups[2].member_order_ids, vec![4]);
    }

    #[test]
    fn unparseable_timestamps_stay_singletons() {
        let orders = vec![order(1, 7, "2025-03-01T10:00:00Z"), order(2, 7, "soon")];
        let groups = detect_groups(&orders, DEFAULT_GROUP_WINDOW_MS, GroupingMode::Anchor);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].primary_order_id, 2);
    }

    #[test]
    fn cache_round_trip_and_member_lookup() {
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let group = OrderGroup {
            primary_order_id: 10,
            member_order_ids: vec![10, 11, 12],
        };
        cache.put(&group).expect("put");

        assert_eq!(cache.get(10), Some(group.clone()));
        assert_eq!(cache.find_containing(12), Some(group));
        assert!(cache.find_containing(99).is_none());

        let raw =
            crate::db::read_json(&store, GROUP_CACHE_CATEGORY, "order_group_10").expect("raw");
        assert_eq!(raw["orderIds"], serde_json::json!([10, 11, 12]));
        assert!(raw["timestamp"].as_i64().unwrap_or(0) > 0);

        cache.clear().expect("clear");
        assert!(cache.get(10).is_none());
    }

    #[test]
    fn resolve_prefers_valid_cache_and_ignores_stale_entries() {
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        // Placed via checkout minutes apart; the time window alone would not group them.
        let orders = vec![
            order(1, 7, "2025-03-01T10:00:00Z"),
            order(2, 7, "2025-03-01T10:05:00Z"),
        ];
        cache
            .put(&OrderGroup {
                primary_order_id: 1,
                member_order_ids: vec![1, 2],
            })
            .expect("put");
        let group = resolve_group(2, &orders, &cache, WINDOW, GroupingMode::Anchor);
        assert_eq!(group.member_order_ids, vec![1, 2]);

        cache
            .put(&OrderGroup {
                primary_order_id: 1,
                member_order_ids: vec![1, 2, 404],
            })
            .expect("put stale");
        let group = resolve_group(2, &orders, &cache, WINDOW, GroupingMode::Anchor);
        assert_eq!(group, OrderGroup::singleton(2));
        assert!(cache.get(1).is_none(), "invalid entry should be dropped");
    }

    #[test]
    fn newest_entry_wins_when_an_order_is_cached_twice() {
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let now = Utc::now().timestamp_millis();
        let stale = OrderGroup {
            primary_order_id: 3,
            member_order_ids: vec![3, 4, 404],
        };
        let fresh = OrderGroup {
            primary_order_id: 4,
            member_order_ids: vec![4, 5],
        };
        cache.put_at(&stale, now - 60_000).expect("put stale");
        cache.put_at(&fresh, now).expect("put fresh");

        // "order_group_3" sorts first, but the newer entry must be returned.
        assert_eq!(cache.find_containing(4), Some(fresh.clone()));
        assert_eq!(cache.find_containing(3), Some(stale.clone()));

        // When the newest entry is the invalid one, resolving drops it and
        // falls through to the valid one.
        cache.put_at(&stale, now + 1_000).expect("rewrite stale");
        let orders = vec![
            order(3, 7, "2025-03-01T09:00:00Z"),
            order(4, 7, "2025-03-01T10:00:00Z"),
            order(5, 7, "2025-03-01T10:05:00Z"),
        ];
        let group = resolve_group(4, &orders, &cache, WINDOW, GroupingMode::Anchor);
        assert_eq!(group, fresh);
        assert!(cache.get(3).is_none());
        assert_eq!(cache.entries().len(), 1);
    }

    #[test]
    fn remember_all_replaces_overlapping_entries() {
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        cache
            .put(&OrderGroup {
                primary_order_id: 1,
                member_order_ids: vec![1, 2],
            })
            .expect("put");
        let regrouped = OrderGroup {
            primary_order_id: 2,
            member_order_ids: vec![2, 3],
        };
        cache.remember_all(&[regrouped.clone(), OrderGroup::singleton(9)]);

        assert!(cache.get(1).is_none());
        assert_eq!(cache.find_containing(2), Some(regrouped));
        assert!(cache.find_containing(9).is_none());
    }

    #[test]
    fn prune_drops_old_and_unreadable_entries() {
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let now = Utc::now().timestamp_millis();
        let old = OrderGroup {
            primary_order_id: 1,
            member_order_ids: vec![1, 2],
        };
        let recent = OrderGroup {
            primary_order_id: 7,
            member_order_ids: vec![7, 8],
        };
        cache
            .put_at(&old, now - GROUP_CACHE_MAX_AGE_MS - 1)
            .expect("put old");
        cache.put_at(&recent, now - 1_000).expect("put recent");
        {
            let conn = store.conn.lock().expect("lock");
            crate::db::set_setting(&conn, GROUP_CACHE_CATEGORY, "order_group_20", "not json")
                .expect("raw");
        }

        let removed = cache
            .prune_older_than(GROUP_CACHE_MAX_AGE_MS, now)
            .expect("prune");
        assert_eq!(removed, 2);
        let left: Vec<i64> = cache
            .entries()
            .into_iter()
            .map(|(g, _)| g.primary_order_id)
            .collect();
        assert_eq!(left, vec![7]);
        assert_eq!(cache.prune_expired(), 0);
    }

    #[test]
    fn resolve_caches_detected_groups() {
        let store = crate::db::init_in_memory().expect("db");
        let cache = GroupCache::new(&store);
        let orders = vec![
            order(5, 7, "2025-03-01T10:00:00Z"),
            order(6, 7, "2025-03-01T10:00:03Z"),
        ];
        let group = resolve_group(6, &orders, &cache, WINDOW, GroupingMode::Transitive);
        assert_eq!(group.primary_order_id, 5);
        assert_eq!(cache.get(5).map(|g| g.member_order_ids), Some(vec![5, 6]));
    }
}
