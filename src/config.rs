//! 运行配置
//!
//! 从环境变量加载（前缀 `LINKSIGHT`，层级分隔符 `__`），
//! 支持 .env 文件。所有字段都有默认值，缺失配置不会阻止启动。

use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::warn;

use crate::errors::{LinksightError, Result};

static CONFIG: OnceCell<AppConfig> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库 URL（sqlite:// / mysql:// / postgres://）
    pub url: String,
    /// 后端名称，缺省时从 URL 推断
    pub backend: Option<String>,
    pub pool_size: u32,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            backend: None,
            pool_size: 10,
            retry_count: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// 网络地址 hash 加盐（落库前对规范化地址加盐散列）
    pub salt: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            salt: "linksight-fp-v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// 独立访客解析信任的最低关联置信度（inherent/high/medium/low）
    pub min_confidence: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_confidence: "medium".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub fingerprint: FingerprintConfig,
    pub aggregation: AggregationConfig,
}

/// 从环境变量加载配置
pub fn load_config() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let source = config::Environment::with_prefix("LINKSIGHT")
        .separator("__")
        .try_parsing(true);

    let cfg = config::Config::builder()
        .add_source(source)
        .build()
        .map_err(|e| LinksightError::config(format!("Failed to read environment: {}", e)))?;

    cfg.try_deserialize()
        .map_err(|e| LinksightError::config(format!("Invalid configuration: {}", e)))
}

/// 获取全局配置（首次访问时加载，加载失败回退默认值）
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(|| match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            AppConfig::default()
        }
    })
}
