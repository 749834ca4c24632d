//! Click event entity for detailed click tracking
//!
//! 一条记录对应一次跳转观测，写入后不可变；仅在链接统计重置时批量删除。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub short_code: String,
    pub clicked_at: DateTimeUtc,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
    /// 规范化网络地址的加盐 xxHash64（不落原始 IP）
    pub ip_hash: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub browser_name: Option<String>,
    pub os_name: Option<String>,
    pub device_category: Option<String>,
    /// 浏览器指纹 hash（CHAR(16) xxHash64 hex）
    pub browser_fingerprint: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
