//! Linksight — 短链接访客识别与点击分析引擎
//!
//! 无 cookie 的访客识别：从请求信号和客户端探测派生设备/浏览器双指纹，
//! 把同一台设备上的多个浏览器关联进一个设备簇，在此之上维护点击事件流、
//! 累计计数器和按时间桶的聚合序列。
//!
//! 典型接入方式：
//!
//! ```no_run
//! use std::sync::Arc;
//! use linksight::recorder::ClickRecorder;
//! use linksight::signals::RequestSignals;
//! use linksight::storage::SeaOrmStorage;
//!
//! # async fn demo() -> linksight::Result<()> {
//! let storage = Arc::new(SeaOrmStorage::from_config().await?);
//! let recorder = ClickRecorder::new(storage);
//!
//! // 跳转热路径上只派发，记录在后台完成
//! recorder.dispatch("abc123", RequestSignals {
//!     remote_addr: "203.0.113.7".to_string(),
//!     user_agent: Some("Mozilla/5.0 ...".to_string()),
//!     ..Default::default()
//! });
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod config;
pub mod correlation;
pub mod enhancer;
pub mod errors;
pub mod fingerprint;
pub mod logging;
pub mod recorder;
pub mod signals;
pub mod storage;

pub use aggregation::{AggregationEngine, Bucket, LinkSeries};
pub use correlation::{Confidence, CorrelationStore};
pub use enhancer::Enhancer;
pub use errors::{LinksightError, Result};
pub use fingerprint::FingerprintPair;
pub use recorder::ClickRecorder;
pub use signals::{ClientProbeBundle, RequestSignals};
pub use storage::SeaOrmStorage;
