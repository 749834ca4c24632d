//! Fingerprint correlation entity
//!
//! 断言某个浏览器指纹归属于某个设备簇。
//! 每个 (short_code, browser_fingerprint) 至多一行；
//! 重复 learn 只更新 last_confirmed，簇合并改写 device_cluster_id。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "fingerprint_correlations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub short_code: String,
    pub browser_fingerprint: String,
    /// 簇根：首个被纳入该簇的浏览器指纹
    pub device_cluster_id: String,
    /// self / device_match / merge
    pub method: String,
    /// inherent / high / medium / low
    pub confidence: String,
    pub first_correlated: DateTimeUtc,
    pub last_confirmed: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
