//! 读取类数据库操作
//!
//! 聚合引擎与关联存取需要的查询：点击行扫描、去重指纹、关联快照。

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::errors::Result;
use migration::entities::{click_event, device_profile, fingerprint_correlation, short_link};

use super::SeaOrmStorage;

/// 聚合扫描用的精简点击行（只取时间和浏览器指纹）
#[derive(Debug, Clone, FromQueryResult)]
pub struct ClickRow {
    pub clicked_at: DateTime<Utc>,
    pub browser_fingerprint: String,
}

impl SeaOrmStorage {
    pub async fn get_link(&self, short_code: &str) -> Result<Option<short_link::Model>> {
        let link = short_link::Entity::find_by_id(short_code)
            .one(self.get_db())
            .await?;
        Ok(link)
    }

    /// 某链接的点击事件总数（对账重算的 total 口径）
    pub async fn count_click_events(&self, short_code: &str) -> Result<u64> {
        let count = click_event::Entity::find()
            .filter(click_event::Column::ShortCode.eq(short_code))
            .count(self.get_db())
            .await?;
        Ok(count)
    }

    /// 扫描时间窗内的点击行，按时间升序
    ///
    /// 窗口为闭区间 [start, end]。
    pub async fn fetch_click_rows(
        &self,
        short_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClickRow>> {
        let rows = click_event::Entity::find()
            .select_only()
            .column(click_event::Column::ClickedAt)
            .column(click_event::Column::BrowserFingerprint)
            .filter(click_event::Column::ShortCode.eq(short_code))
            .filter(click_event::Column::ClickedAt.gte(start))
            .filter(click_event::Column::ClickedAt.lte(end))
            .order_by_asc(click_event::Column::ClickedAt)
            .into_model::<ClickRow>()
            .all(self.get_db())
            .await?;
        Ok(rows)
    }

    /// 出现过的去重浏览器指纹（对账重算的 unique 口径输入）
    pub async fn distinct_browser_fingerprints(&self, short_code: &str) -> Result<Vec<String>> {
        let fps: Vec<String> = click_event::Entity::find()
            .select_only()
            .column(click_event::Column::BrowserFingerprint)
            .distinct()
            .filter(click_event::Column::ShortCode.eq(short_code))
            .into_tuple()
            .all(self.get_db())
            .await?;
        Ok(fps)
    }

    /// 某链接的全部指纹关联快照
    pub async fn load_correlations(
        &self,
        short_code: &str,
    ) -> Result<Vec<fingerprint_correlation::Model>> {
        let rows = fingerprint_correlation::Entity::find()
            .filter(fingerprint_correlation::Column::ShortCode.eq(short_code))
            .all(self.get_db())
            .await?;
        Ok(rows)
    }

    pub async fn find_correlation(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
    ) -> Result<Option<fingerprint_correlation::Model>> {
        let row = fingerprint_correlation::Entity::find()
            .filter(fingerprint_correlation::Column::ShortCode.eq(short_code))
            .filter(fingerprint_correlation::Column::BrowserFingerprint.eq(browser_fingerprint))
            .one(self.get_db())
            .await?;
        Ok(row)
    }

    /// 簇根自关联行（用于合并仲裁：比较 first_correlated）
    pub async fn find_cluster_root(
        &self,
        short_code: &str,
        cluster_id: &str,
    ) -> Result<Option<fingerprint_correlation::Model>> {
        let row = fingerprint_correlation::Entity::find()
            .filter(fingerprint_correlation::Column::ShortCode.eq(short_code))
            .filter(fingerprint_correlation::Column::BrowserFingerprint.eq(cluster_id))
            .one(self.get_db())
            .await?;
        Ok(row)
    }

    pub async fn find_profile(
        &self,
        short_code: &str,
        browser_fingerprint: &str,
    ) -> Result<Option<device_profile::Model>> {
        let row = device_profile::Entity::find()
            .filter(device_profile::Column::ShortCode.eq(short_code))
            .filter(device_profile::Column::BrowserFingerprint.eq(browser_fingerprint))
            .one(self.get_db())
            .await?;
        Ok(row)
    }

    /// 同设备指纹下的兄弟档案，按 first_seen 升序（最老的在前）
    pub async fn find_profiles_by_device(
        &self,
        short_code: &str,
        device_fingerprint: &str,
    ) -> Result<Vec<device_profile::Model>> {
        let rows = device_profile::Entity::find()
            .filter(device_profile::Column::ShortCode.eq(short_code))
            .filter(device_profile::Column::DeviceFingerprint.eq(device_fingerprint))
            .order_by_asc(device_profile::Column::FirstSeen)
            .all(self.get_db())
            .await?;
        Ok(rows)
    }
}
