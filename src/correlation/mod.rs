//! Fingerprint correlation store
//!
//! Maps browser fingerprints onto device clusters. A cluster is identified
//! by the browser fingerprint of its first-admitted member, so the common
//! single-browser visitor never pays for an extra identifier. Correlations
//! are learned from device-fingerprint matches at click time and revised by
//! cluster merges when the async enhancer upgrades a fingerprint.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use migration::entities::fingerprint_correlation;

/// Confidence grade of a correlation, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    /// Reserved for address-only heuristics
    Low,
    /// Device-fingerprint match where at least one side is provisional
    Medium,
    /// Device-fingerprint match between enhanced profiles, or a merge
    High,
    /// A fingerprint's correlation to itself
    Inherent,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Inherent => "inherent",
        }
    }

    /// 未知取值按最低档处理，旧库里的脏数据不会抬高置信度
    pub fn parse(s: &str) -> Confidence {
        match s {
            "inherent" => Confidence::Inherent,
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Outcome of admitting one browser fingerprint into a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterResolution {
    pub cluster_id: String,
    pub confidence: Confidence,
    /// True when the resolved cluster already existed before this call
    pub previously_seen: bool,
}

/// Resolve a fingerprint against a correlation snapshot.
///
/// Correlations below `min_confidence` are ignored and the fingerprint
/// falls back to being its own cluster.
pub fn resolve_in_snapshot(
    correlations: &HashMap<String, fingerprint_correlation::Model>,
    browser_fingerprint: &str,
    min_confidence: Confidence,
) -> String {
    match correlations.get(browser_fingerprint) {
        Some(row) if Confidence::parse(&row.confidence) >= min_confidence => {
            row.device_cluster_id.clone()
        }
        _ => browser_fingerprint.to_string(),
    }
}

/// 指纹关联存取层
#[derive(Clone)]
pub struct CorrelationStore {
    storage: Arc<SeaOrmStorage>,
}

impl CorrelationStore {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 当前簇归属：有关联行取其簇，否则指纹自成一簇
    pub async fn resolve(&self, short_code: &str, browser_fingerprint: &str) -> Result<String> {
        let row = self
            .storage
            .find_correlation(short_code, browser_fingerprint)
            .await?;
        Ok(match row {
            Some(row) => row.device_cluster_id,
            None => browser_fingerprint.to_string(),
        })
    }

    /// 点击时学习：把浏览器指纹纳入某个设备簇
    ///
    /// 已有关联只刷新 last_confirmed；否则按设备指纹找兄弟档案，
    /// 归入最老兄弟所在簇；都没有就自成一簇。并发下先写者胜，
    /// 败者读回先写者的结果。
    pub async fn learn(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        device_fingerprint: &str,
        enhanced: bool,
        now: DateTime<Utc>,
    ) -> Result<ClusterResolution> {
        if let Some(existing) = self
            .storage
            .find_correlation(short_code, browser_fingerprint)
            .await?
        {
            self.storage
                .touch_correlation(short_code, browser_fingerprint, now)
                .await?;
            return Ok(ClusterResolution {
                cluster_id: existing.device_cluster_id,
                confidence: Confidence::parse(&existing.confidence),
                previously_seen: true,
            });
        }

        // 同设备指纹的最老兄弟决定簇归属
        let sibling = self
            .storage
            .find_profiles_by_device(short_code, device_fingerprint)
            .await?
            .into_iter()
            .find(|p| p.browser_fingerprint != browser_fingerprint);

        let (cluster_id, confidence, previously_seen) = match sibling {
            Some(sibling) => {
                let cluster = self
                    .resolve(short_code, &sibling.browser_fingerprint)
                    .await?;
                let confidence = if sibling.enhanced && enhanced {
                    Confidence::High
                } else {
                    Confidence::Medium
                };
                debug!(
                    "Correlating '{}' into cluster '{}' for '{}' via device match",
                    browser_fingerprint, cluster, short_code
                );
                (cluster, confidence, true)
            }
            None => (
                browser_fingerprint.to_string(),
                Confidence::Inherent,
                false,
            ),
        };

        let method = if previously_seen { "device_match" } else { "self" };
        let created = self
            .storage
            .insert_correlation(
                short_code,
                browser_fingerprint,
                &cluster_id,
                method,
                confidence.as_str(),
                now,
            )
            .await?;

        if created {
            return Ok(ClusterResolution {
                cluster_id,
                confidence,
                previously_seen,
            });
        }

        // 竞态败者：读回先写者的关联
        let winner = self
            .storage
            .find_correlation(short_code, browser_fingerprint)
            .await?;
        Ok(match winner {
            Some(row) => ClusterResolution {
                cluster_id: row.device_cluster_id,
                confidence: Confidence::parse(&row.confidence),
                previously_seen: true,
            },
            None => ClusterResolution {
                cluster_id,
                confidence,
                previously_seen,
            },
        })
    }

    /// 指纹升级后重估簇归属，必要时合并
    ///
    /// 新设备指纹命中了别的簇时，把较晚建立的簇整体改挂到较早的簇
    /// 下（平局按簇 id 字典序取小者）。返回是否发生了合并。
    pub async fn reevaluate(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        new_device_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let own = match self
            .storage
            .find_correlation(short_code, browser_fingerprint)
            .await?
        {
            Some(row) => row,
            None => {
                self.learn(
                    short_code,
                    browser_fingerprint,
                    new_device_fingerprint,
                    true,
                    now,
                )
                .await?;
                return Ok(false);
            }
        };

        let siblings = self
            .storage
            .find_profiles_by_device(short_code, new_device_fingerprint)
            .await?;

        for sibling in siblings {
            if sibling.browser_fingerprint == browser_fingerprint {
                continue;
            }
            let sibling_cluster = self
                .resolve(short_code, &sibling.browser_fingerprint)
                .await?;
            if sibling_cluster == own.device_cluster_id {
                continue;
            }

            let (winner, loser) = self
                .pick_winner(short_code, &own.device_cluster_id, &sibling_cluster)
                .await?;
            let repointed = self
                .storage
                .repoint_cluster(short_code, &loser, &winner, now)
                .await?;
            info!(
                "Merged cluster '{}' into '{}' for '{}' ({} correlations repointed)",
                loser, winner, short_code, repointed
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// 合并仲裁：簇根 first_correlated 早者胜，平局取簇 id 小者
    async fn pick_winner(
        &self,
        short_code: &str,
        a: &str,
        b: &str,
    ) -> Result<(String, String)> {
        let root_a = self.storage.find_cluster_root(short_code, a).await?;
        let root_b = self.storage.find_cluster_root(short_code, b).await?;

        let a_wins = match (root_a, root_b) {
            (Some(ra), Some(rb)) => match ra.first_correlated.cmp(&rb.first_correlated) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => a < b,
            },
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => a < b,
        };

        if a_wins {
            Ok((a.to_string(), b.to_string()))
        } else {
            Ok((b.to_string(), a.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Inherent > Confidence::High);
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_confidence_parse_unknown_is_low() {
        assert_eq!(Confidence::parse("inherent"), Confidence::Inherent);
        assert_eq!(Confidence::parse("garbage"), Confidence::Low);
    }

    #[test]
    fn test_resolve_in_snapshot_threshold() {
        let mut map = HashMap::new();
        map.insert(
            "fp-b".to_string(),
            fingerprint_correlation::Model {
                id: 1,
                short_code: "abc".to_string(),
                browser_fingerprint: "fp-b".to_string(),
                device_cluster_id: "fp-a".to_string(),
                method: "device_match".to_string(),
                confidence: "medium".to_string(),
                first_correlated: Utc::now(),
                last_confirmed: Utc::now(),
            },
        );

        // medium 阈值下命中簇，high 阈值下退回自身
        assert_eq!(resolve_in_snapshot(&map, "fp-b", Confidence::Medium), "fp-a");
        assert_eq!(resolve_in_snapshot(&map, "fp-b", Confidence::High), "fp-b");
        assert_eq!(resolve_in_snapshot(&map, "fp-x", Confidence::Low), "fp-x");
    }
}
