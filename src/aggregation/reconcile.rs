//! 计数器对账
//!
//! 从事件流和关联快照重算链接计数器并覆盖写回。计数器自增是
//! 尽力而为的，簇合并也会让历史 unique 偏高；任何漂移都能被
//! 本次重算修复。

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::correlation::{Confidence, resolve_in_snapshot};
use crate::errors::Result;
use crate::storage::SeaOrmStorage;

/// 重算后的计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCounters {
    pub total_clicks: i64,
    pub unique_visitors: i64,
}

/// 重算并写回某链接的计数器
///
/// total 取事件行数，unique 取去重指纹按当前关联快照归簇后的簇数，
/// 置信度阈值与聚合引擎一致。
pub async fn reconcile_link_counters(
    storage: &SeaOrmStorage,
    short_code: &str,
) -> Result<LinkCounters> {
    let min_confidence =
        Confidence::parse(&crate::config::get_config().aggregation.min_confidence);

    let total_clicks = storage.count_click_events(short_code).await? as i64;

    let fingerprints = storage.distinct_browser_fingerprints(short_code).await?;
    let correlations: HashMap<_, _> = storage
        .load_correlations(short_code)
        .await?
        .into_iter()
        .map(|row| (row.browser_fingerprint.clone(), row))
        .collect();

    let clusters: HashSet<String> = fingerprints
        .iter()
        .map(|fp| resolve_in_snapshot(&correlations, fp, min_confidence))
        .collect();
    let unique_visitors = clusters.len() as i64;

    storage
        .set_link_counters(short_code, total_clicks, unique_visitors)
        .await?;

    debug!(
        "Reconciled counters for '{}': total={} unique={}",
        short_code, total_clicks, unique_visitors
    );

    Ok(LinkCounters {
        total_clicks,
        unique_visitors,
    })
}
