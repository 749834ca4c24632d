//! 点击记录管线
//!
//! 跳转热路径上只做派发：点击落库、档案 upsert、关联学习和计数器
//! 自增全部在后台任务里完成，任何失败只记日志，绝不影响跳转。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::correlation::CorrelationStore;
use crate::errors::Result;
use crate::fingerprint;
use crate::signals::{self, RequestSignals};
use crate::storage::{NewClickEvent, NewDeviceProfile, SeaOrmStorage};

/// 点击记录器
#[derive(Clone)]
pub struct ClickRecorder {
    storage: Arc<SeaOrmStorage>,
    correlations: CorrelationStore,
}

impl ClickRecorder {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let correlations = CorrelationStore::new(storage.clone());
        Self {
            storage,
            correlations,
        }
    }

    /// 异步派发一次点击记录（fire-and-forget）
    ///
    /// 立即返回；记录失败在后台任务里吞掉并记 warn。
    pub fn dispatch(&self, short_code: &str, signals: RequestSignals) {
        let recorder = self.clone();
        let short_code = short_code.to_string();
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&short_code, &signals).await {
                warn!("Failed to record click for '{}': {}", short_code, e);
            }
        });
    }

    /// 记录一次点击：事件落库、档案 upsert、关联学习、计数器自增
    pub async fn record(&self, short_code: &str, signals: &RequestSignals) -> Result<()> {
        let now = Utc::now();
        let extracted = signals::extract(signals);
        let pair = fingerprint::generate(&extracted, None);

        self.storage
            .insert_click_event(NewClickEvent {
                short_code: short_code.to_string(),
                clicked_at: now,
                referrer: extracted.referrer.clone(),
                ip_hash: Some(extracted.net_hash.clone()),
                country: extracted.country.clone(),
                region: extracted.region.clone(),
                city: extracted.city.clone(),
                browser_name: extracted.ua.browser_name.clone(),
                os_name: extracted.ua.os_name.clone(),
                device_category: extracted.ua.device_category.clone(),
                browser_fingerprint: pair.browser.clone(),
            })
            .await?;

        // 档案与关联失败不拦截事件流，退化为不增加 unique
        let profile_created = match self
            .storage
            .upsert_device_profile(NewDeviceProfile {
                short_code: short_code.to_string(),
                browser_fingerprint: pair.browser.clone(),
                device_fingerprint: pair.device.clone(),
                net_hash: extracted.net_hash.clone(),
                os_family: extracted.ua.os_family.clone(),
                observed_at: now,
            })
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!("Profile upsert failed for '{}': {}", short_code, e);
                false
            }
        };

        let is_new_unique = match self
            .correlations
            .learn(short_code, &pair.browser, &pair.device, false, now)
            .await
        {
            Ok(resolution) => {
                debug!(
                    "Click on '{}' resolved to cluster '{}'",
                    short_code, resolution.cluster_id
                );
                profile_created && !resolution.previously_seen
            }
            Err(e) => {
                warn!("Correlation learn failed for '{}': {}", short_code, e);
                profile_created
            }
        };

        self.storage
            .increment_link_counters(short_code, is_new_unique)
            .await?;

        Ok(())
    }
}
