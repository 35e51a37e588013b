use anyhow::anyhow;
use chrono::{TimeZone, Utc};

use crate::context::AppContext;
use crate::grouping::GroupCache;

pub fn list(ctx: &AppContext) -> String {
    let entries = GroupCache::new(&ctx.db).entries();
    if entries.is_empty() {
        return "No cached order groups".to_string();
    }
    entries
        .into_iter()
        .map(|(group, written)| {
            let members: Vec<String> =
                group.member_order_ids.iter().map(|id| format!("#{id}")).collect();
            let when = Utc
                .timestamp_millis_opt(written)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!("#{:<6} {}  ({when})", group.primary_order_id, members.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn clear(ctx: &AppContext) -> anyhow::Result<String> {
    let cache = GroupCache::new(&ctx.db);
    let count = cache.entries().len();
    cache.clear().map_err(|e| anyhow!(e))?;
    Ok(format!("Cleared {count} cached order group(s)"))
}

pub fn prune(ctx: &AppContext) -> String {
    let removed = GroupCache::new(&ctx.db).prune_expired();
    format!("Pruned {removed} expired order group(s)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::OrderGroup;
    use std::path::PathBuf;

    fn ctx() -> AppContext {
        let db = crate::db::init_in_memory().expect("db");
        AppContext::with_store(PathBuf::from("/tmp/desk"), db, None, true)
    }

    #[test]
    fn list_then_clear() {
        let ctx = ctx();
        assert_eq!(list(&ctx), "No cached order groups");

        GroupCache::new(&ctx.db)
            .put(&OrderGroup {
                primary_order_id: 12,
                member_order_ids: vec![12, 13],
            })
            .expect("put");
        assert!(list(&ctx).starts_with("#12     #12, #13"));
        assert_eq!(prune(&ctx), "Pruned 0 expired order group(s)");

        assert_eq!(clear(&ctx).expect("clear"), "Cleared 1 cached order group(s)");
        assert!(GroupCache::new(&ctx.db).get(12).is_none());
        assert_eq!(list(&ctx), "No cached order groups");
    }
}
