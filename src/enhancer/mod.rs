//! 异步指纹增强
//!
//! 跳转完成后客户端上报探测包，在后台把档案从服务端信号升级为
//! 全量信号，重算设备指纹，并在簇归属变化时触发合并与对账。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::aggregation::reconcile_link_counters;
use crate::correlation::CorrelationStore;
use crate::errors::Result;
use crate::fingerprint;
use crate::signals::ClientProbeBundle;
use crate::storage::{ProfileEnhancement, SeaOrmStorage};

/// 探测包增强器
#[derive(Clone)]
pub struct Enhancer {
    storage: Arc<SeaOrmStorage>,
    correlations: CorrelationStore,
}

impl Enhancer {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let correlations = CorrelationStore::new(storage.clone());
        Self {
            storage,
            correlations,
        }
    }

    /// 异步派发一次增强（fire-and-forget）
    pub fn dispatch(&self, short_code: &str, browser_fingerprint: &str, bundle: ClientProbeBundle) {
        let enhancer = self.clone();
        let short_code = short_code.to_string();
        let browser_fingerprint = browser_fingerprint.to_string();
        tokio::spawn(async move {
            if let Err(e) = enhancer
                .enhance(&short_code, &browser_fingerprint, &bundle)
                .await
            {
                warn!("Enhancement failed for '{}': {}", short_code, e);
            }
        });
    }

    /// 应用探测包：合并信号、重算设备指纹、必要时合并簇并对账
    ///
    /// 对应档案不存在时整包为 no-op（探测先于点击到达，或事件流失败）。
    pub async fn enhance(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        bundle: &ClientProbeBundle,
    ) -> Result<()> {
        let now = Utc::now();

        if !bundle.is_supported_version() {
            debug!(
                "Probe bundle for '{}' declares unsupported schema {:?}, dropping",
                short_code, bundle.schema_version
            );
            return Ok(());
        }

        let profile = match self
            .storage
            .find_profile(short_code, browser_fingerprint)
            .await?
        {
            Some(profile) => profile,
            None => {
                debug!(
                    "No profile for '{}' on '{}', dropping probe bundle",
                    browser_fingerprint, short_code
                );
                return Ok(());
            }
        };

        // 探测值优先，未探测字段保留既有值
        let timezone = bundle.timezone_token().or(profile.timezone.clone());
        let screen = bundle.screen_token().or(profile.screen.clone());
        let hardware_concurrency = bundle
            .hardware_concurrency
            .map(|c| c as i32)
            .or(profile.hardware_concurrency);

        let new_device_fp = fingerprint::device_fingerprint(
            &profile.net_hash,
            profile.os_family.as_deref(),
            timezone.as_deref(),
            screen.as_deref(),
            hardware_concurrency,
        );

        let enhanced = profile.enhanced || bundle.has_device_signals();
        let probe_json = serde_json::to_string(bundle)?;

        self.storage
            .apply_profile_enhancement(
                short_code,
                browser_fingerprint,
                ProfileEnhancement {
                    device_fingerprint: new_device_fp.clone(),
                    enhanced,
                    screen,
                    timezone,
                    hardware_concurrency,
                    canvas_signature: bundle.canvas_signature.clone(),
                    webgl_signature: bundle.webgl_signature.clone(),
                    audio_signature: bundle.audio_signature.clone(),
                    fonts_hash: bundle.fonts_hash(),
                    storage_flags: bundle.storage_flags(),
                    probe_json: Some(probe_json),
                },
                now,
            )
            .await?;

        if new_device_fp == profile.device_fingerprint {
            return Ok(());
        }

        debug!(
            "Device fingerprint upgraded for '{}' on '{}'",
            browser_fingerprint, short_code
        );

        let merged = self
            .correlations
            .reevaluate(short_code, browser_fingerprint, &new_device_fp, now)
            .await?;

        if merged {
            let counters = reconcile_link_counters(&self.storage, short_code).await?;
            info!(
                "Counters reconciled for '{}' after merge: total={} unique={}",
                short_code, counters.total_clicks, counters.unique_visitors
            );
        }

        Ok(())
    }
}
