//! Device signal profile entity
//!
//! 每个 (short_code, browser_fingerprint) 至多一行，
//! 由 Click Recorder 创建、Async Enhancer 补充客户端探测信号。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "device_profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub short_code: String,
    /// CHAR(16) xxHash64 hex
    pub browser_fingerprint: String,
    /// CHAR(16) xxHash64 hex；增强前由服务端信号计算，视为临时值
    pub device_fingerprint: String,
    /// 是否已被客户端信号增强（device_fingerprint 不再是临时值）
    pub enhanced: bool,
    /// 规范化网络地址的加盐 hash（参与设备指纹重算）
    pub net_hash: String,
    pub os_family: Option<String>,
    pub timezone: Option<String>,
    /// "宽x高x色深"，来自客户端探测
    pub screen: Option<String>,
    pub hardware_concurrency: Option<i32>,
    pub canvas_signature: Option<String>,
    pub webgl_signature: Option<String>,
    pub audio_signature: Option<String>,
    /// 字体列表 hash（CHAR(16)）
    pub fonts_hash: Option<String>,
    /// 存储能力位串，如 "1101"（local/session/indexeddb/cookie）
    pub storage_flags: Option<String>,
    /// 原始探测包 JSON（保留全部稀疏键值，便于重算与排查）
    #[sea_orm(column_type = "Text", nullable)]
    pub probe_json: Option<String>,
    pub first_seen: DateTimeUtc,
    pub last_seen: DateTimeUtc,
    pub visit_count: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
