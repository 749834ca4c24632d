//! 写入类数据库操作
//!
//! 点击事件插入、档案/关联 upsert（冲突忽略，先写者胜）、
//! 计数器原子自增与重置。

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, ExprTrait, QueryFilter,
    sea_query::{Expr, OnConflict},
};
use tracing::debug;

use crate::errors::Result;
use migration::entities::{click_event, device_profile, fingerprint_correlation, short_link};

use super::{NewClickEvent, NewDeviceProfile, SeaOrmStorage, retry};

/// Async Enhancer 带来的档案更新
///
/// 物理字段 last-write-wins：仅覆盖本次探测到的字段，未探测字段保持原值。
#[derive(Debug, Clone, Default)]
pub struct ProfileEnhancement {
    pub device_fingerprint: String,
    pub enhanced: bool,
    pub screen: Option<String>,
    pub timezone: Option<String>,
    pub hardware_concurrency: Option<i32>,
    pub canvas_signature: Option<String>,
    pub webgl_signature: Option<String>,
    pub audio_signature: Option<String>,
    pub fonts_hash: Option<String>,
    pub storage_flags: Option<String>,
    pub probe_json: Option<String>,
}

impl SeaOrmStorage {
    /// 创建短链接（计数器从零开始）
    pub async fn create_link(
        &self,
        short_code: &str,
        target_url: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let model = short_link::ActiveModel {
            short_code: Set(short_code.to_string()),
            target_url: Set(target_url.to_string()),
            created_at: Set(created_at),
            expires_at: Set(None),
            total_clicks: Set(0),
            unique_visitors: Set(0),
        };
        short_link::Entity::insert(model).exec(self.get_db()).await?;
        Ok(())
    }

    /// 插入一条点击事件（append-only，失败不重试——丢点击优于加延迟）
    pub async fn insert_click_event(&self, event: NewClickEvent) -> Result<()> {
        let model = click_event::ActiveModel {
            short_code: Set(event.short_code),
            clicked_at: Set(event.clicked_at),
            referrer: Set(event.referrer),
            ip_hash: Set(event.ip_hash),
            country: Set(event.country),
            region: Set(event.region),
            city: Set(event.city),
            browser_name: Set(event.browser_name),
            os_name: Set(event.os_name),
            device_category: Set(event.device_category),
            browser_fingerprint: Set(event.browser_fingerprint),
            ..Default::default()
        };
        click_event::Entity::insert(model).exec(self.get_db()).await?;
        Ok(())
    }

    /// Upsert 设备档案
    ///
    /// 返回是否新建了档案行。已存在时原子自增 visit_count 并刷新
    /// last_seen；并发首次写入由唯一索引仲裁，先写者胜，败者降级为更新。
    pub async fn upsert_device_profile(&self, profile: NewDeviceProfile) -> Result<bool> {
        let db = self.get_db();

        let existing = device_profile::Entity::find()
            .filter(device_profile::Column::ShortCode.eq(&profile.short_code))
            .filter(device_profile::Column::BrowserFingerprint.eq(&profile.browser_fingerprint))
            .one(db)
            .await?;

        if existing.is_some() {
            self.bump_profile_visit(&profile.short_code, &profile.browser_fingerprint, profile.observed_at)
                .await?;
            return Ok(false);
        }

        let model = device_profile::ActiveModel {
            short_code: Set(profile.short_code.clone()),
            browser_fingerprint: Set(profile.browser_fingerprint.clone()),
            device_fingerprint: Set(profile.device_fingerprint),
            enhanced: Set(false),
            net_hash: Set(profile.net_hash),
            os_family: Set(profile.os_family),
            first_seen: Set(profile.observed_at),
            last_seen: Set(profile.observed_at),
            visit_count: Set(1),
            ..Default::default()
        };

        match device_profile::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    device_profile::Column::ShortCode,
                    device_profile::Column::BrowserFingerprint,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(db)
            .await
        {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => {
                // 并发竞态：别的请求抢先建档，本次退化为一次回访
                debug!(
                    "Profile insert raced for '{}', falling back to visit bump",
                    profile.short_code
                );
                self.bump_profile_visit(
                    &profile.short_code,
                    &profile.browser_fingerprint,
                    profile.observed_at,
                )
                .await?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn bump_profile_visit(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        device_profile::Entity::update_many()
            .col_expr(
                device_profile::Column::VisitCount,
                Expr::col(device_profile::Column::VisitCount).add(1),
            )
            .col_expr(device_profile::Column::LastSeen, Expr::value(observed_at))
            .filter(device_profile::Column::ShortCode.eq(short_code))
            .filter(device_profile::Column::BrowserFingerprint.eq(browser_fingerprint))
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    /// 应用客户端探测增强（物理字段 last-write-wins）
    pub async fn apply_profile_enhancement(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        update: ProfileEnhancement,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut query = device_profile::Entity::update_many()
            .col_expr(
                device_profile::Column::DeviceFingerprint,
                Expr::value(update.device_fingerprint),
            )
            .col_expr(device_profile::Column::Enhanced, Expr::value(update.enhanced))
            .col_expr(device_profile::Column::LastSeen, Expr::value(now));

        if let Some(screen) = update.screen {
            query = query.col_expr(device_profile::Column::Screen, Expr::value(screen));
        }
        if let Some(tz) = update.timezone {
            query = query.col_expr(device_profile::Column::Timezone, Expr::value(tz));
        }
        if let Some(hw) = update.hardware_concurrency {
            query = query.col_expr(device_profile::Column::HardwareConcurrency, Expr::value(hw));
        }
        if let Some(canvas) = update.canvas_signature {
            query = query.col_expr(device_profile::Column::CanvasSignature, Expr::value(canvas));
        }
        if let Some(webgl) = update.webgl_signature {
            query = query.col_expr(device_profile::Column::WebglSignature, Expr::value(webgl));
        }
        if let Some(audio) = update.audio_signature {
            query = query.col_expr(device_profile::Column::AudioSignature, Expr::value(audio));
        }
        if let Some(fonts) = update.fonts_hash {
            query = query.col_expr(device_profile::Column::FontsHash, Expr::value(fonts));
        }
        if let Some(flags) = update.storage_flags {
            query = query.col_expr(device_profile::Column::StorageFlags, Expr::value(flags));
        }
        if let Some(json) = update.probe_json {
            query = query.col_expr(device_profile::Column::ProbeJson, Expr::value(json));
        }

        query
            .filter(device_profile::Column::ShortCode.eq(short_code))
            .filter(device_profile::Column::BrowserFingerprint.eq(browser_fingerprint))
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    /// 插入指纹关联（冲突忽略）。返回是否新建。
    pub async fn insert_correlation(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        device_cluster_id: &str,
        method: &str,
        confidence: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let model = fingerprint_correlation::ActiveModel {
            short_code: Set(short_code.to_string()),
            browser_fingerprint: Set(browser_fingerprint.to_string()),
            device_cluster_id: Set(device_cluster_id.to_string()),
            method: Set(method.to_string()),
            confidence: Set(confidence.to_string()),
            first_correlated: Set(now),
            last_confirmed: Set(now),
            ..Default::default()
        };

        match fingerprint_correlation::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    fingerprint_correlation::Column::ShortCode,
                    fingerprint_correlation::Column::BrowserFingerprint,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(self.get_db())
            .await
        {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 重复 learn：只刷新 last_confirmed
    pub async fn touch_correlation(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        fingerprint_correlation::Entity::update_many()
            .col_expr(
                fingerprint_correlation::Column::LastConfirmed,
                Expr::value(now),
            )
            .filter(fingerprint_correlation::Column::ShortCode.eq(short_code))
            .filter(fingerprint_correlation::Column::BrowserFingerprint.eq(browser_fingerprint))
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    /// 簇合并：把 from_cluster 的全部成员改写到 to_cluster
    ///
    /// 返回改写的行数。幂等：重复合并改写零行。
    pub async fn repoint_cluster(
        &self,
        short_code: &str,
        from_cluster: &str,
        to_cluster: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = fingerprint_correlation::Entity::update_many()
            .col_expr(
                fingerprint_correlation::Column::DeviceClusterId,
                Expr::value(to_cluster),
            )
            .col_expr(
                fingerprint_correlation::Column::Method,
                Expr::value("merge"),
            )
            .col_expr(
                fingerprint_correlation::Column::Confidence,
                Expr::value("high"),
            )
            .col_expr(
                fingerprint_correlation::Column::LastConfirmed,
                Expr::value(now),
            )
            .filter(fingerprint_correlation::Column::ShortCode.eq(short_code))
            .filter(fingerprint_correlation::Column::DeviceClusterId.eq(from_cluster))
            .exec(self.get_db())
            .await?;
        Ok(result.rows_affected)
    }

    /// 点击计数自增（unique 仅在设备簇首次出现时 +1）
    ///
    /// 计数器更新是热点写，包一层退避重试。
    pub async fn increment_link_counters(&self, short_code: &str, unique: bool) -> Result<()> {
        let db = self.get_db();
        retry::with_retry("increment_link_counters", self.retry_config(), || async {
            let mut query = short_link::Entity::update_many().col_expr(
                short_link::Column::TotalClicks,
                Expr::col(short_link::Column::TotalClicks).add(1),
            );
            if unique {
                query = query.col_expr(
                    short_link::Column::UniqueVisitors,
                    Expr::col(short_link::Column::UniqueVisitors).add(1),
                );
            }
            query
                .filter(short_link::Column::ShortCode.eq(short_code))
                .exec(db)
                .await
        })
        .await?;
        Ok(())
    }

    /// 覆盖式写入计数器（由对账重算调用）
    pub async fn set_link_counters(
        &self,
        short_code: &str,
        total_clicks: i64,
        unique_visitors: i64,
    ) -> Result<()> {
        let db = self.get_db();
        retry::with_retry("set_link_counters", self.retry_config(), || async {
            short_link::Entity::update_many()
                .col_expr(short_link::Column::TotalClicks, Expr::value(total_clicks))
                .col_expr(
                    short_link::Column::UniqueVisitors,
                    Expr::value(unique_visitors),
                )
                .filter(short_link::Column::ShortCode.eq(short_code))
                .exec(db)
                .await
        })
        .await?;
        Ok(())
    }

    /// 重置链接统计：删事件、档案、关联，计数器清零
    pub async fn reset_link_stats(&self, short_code: &str) -> Result<()> {
        let db = self.get_db();

        let events = click_event::Entity::delete_many()
            .filter(click_event::Column::ShortCode.eq(short_code))
            .exec(db)
            .await?
            .rows_affected;

        device_profile::Entity::delete_many()
            .filter(device_profile::Column::ShortCode.eq(short_code))
            .exec(db)
            .await?;

        fingerprint_correlation::Entity::delete_many()
            .filter(fingerprint_correlation::Column::ShortCode.eq(short_code))
            .exec(db)
            .await?;

        self.set_link_counters(short_code, 0, 0).await?;

        debug!("Reset stats for '{}': {} events deleted", short_code, events);
        Ok(())
    }
}
