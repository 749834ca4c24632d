//! 客户端探测信号包
//!
//! 跳转完成后由客户端异步上报的补充信号。字段全部可选：缺失的探测是
//! 显式的 "unknown"，不会被默认成误导性的零值；未知键直接忽略，
//! 永远不构成校验失败。

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

/// 探测包 schema 版本（键集合变更时递增）
pub const PROBE_SCHEMA_VERSION: u32 = 1;

/// 稀疏的客户端探测信号包
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientProbeBundle {
    pub schema_version: Option<u32>,

    // 屏幕与视口
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub color_depth: Option<u32>,
    pub pixel_depth: Option<u32>,
    pub device_pixel_ratio: Option<f64>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,

    // 时区与硬件
    pub timezone: Option<String>,
    pub timezone_offset_minutes: Option<i32>,
    pub hardware_concurrency: Option<u32>,
    pub max_touch_points: Option<u32>,

    // 渲染签名
    pub canvas_signature: Option<String>,
    pub webgl_signature: Option<String>,
    pub audio_signature: Option<String>,

    // 字体与存储能力
    pub fonts: Option<Vec<String>>,
    pub local_storage: Option<bool>,
    pub session_storage: Option<bool>,
    pub indexed_db: Option<bool>,
    pub cookies_enabled: Option<bool>,

    // 环境
    pub connection_type: Option<String>,
    pub connection_downlink: Option<f64>,
    pub battery_level: Option<f64>,
    pub battery_charging: Option<bool>,
    pub media_devices: Option<Vec<String>>,
    pub performance_signature: Option<String>,
    pub css_features: Option<Vec<String>>,
    pub js_features: Option<Vec<String>>,
}

impl ClientProbeBundle {
    /// 声明的 schema 版本是否可被当前实现消费（未声明按 v1 处理）
    ///
    /// 版本只在键集合变更时递增，更高版本的包可能携带语义已变的键，
    /// 消费方应整包丢弃而不是按旧语义解读。
    pub fn is_supported_version(&self) -> bool {
        self.schema_version.unwrap_or(PROBE_SCHEMA_VERSION) <= PROBE_SCHEMA_VERSION
    }

    /// 屏幕 token："宽x高x色深"，任一缺失则整体缺失
    pub fn screen_token(&self) -> Option<String> {
        match (self.screen_width, self.screen_height) {
            (Some(w), Some(h)) => {
                let depth = self.color_depth.unwrap_or(0);
                Some(format!("{}x{}x{}", w, h, depth))
            }
            _ => None,
        }
    }

    /// 时区 token：优先时区名，退化为 UTC 偏移
    pub fn timezone_token(&self) -> Option<String> {
        self.timezone
            .clone()
            .or_else(|| self.timezone_offset_minutes.map(|m| format!("utc{:+}", m)))
    }

    /// 字体列表 hash（排序后散列，顺序无关）
    pub fn fonts_hash(&self) -> Option<String> {
        self.fonts.as_ref().map(|fonts| {
            let mut sorted: Vec<&str> = fonts.iter().map(|s| s.as_str()).collect();
            sorted.sort_unstable();
            format!("{:016x}", xxh64(sorted.join(",").as_bytes(), 0))
        })
    }

    /// 存储能力位串：local/session/indexeddb/cookie，'1'/'0'/'-'(未探测)
    pub fn storage_flags(&self) -> Option<String> {
        let flags = [
            self.local_storage,
            self.session_storage,
            self.indexed_db,
            self.cookies_enabled,
        ];
        if flags.iter().all(|f| f.is_none()) {
            return None;
        }
        Some(
            flags
                .iter()
                .map(|f| match f {
                    Some(true) => '1',
                    Some(false) => '0',
                    None => '-',
                })
                .collect(),
        )
    }

    /// 是否携带任何参与设备指纹的信号
    pub fn has_device_signals(&self) -> bool {
        self.screen_token().is_some()
            || self.timezone_token().is_some()
            || self.hardware_concurrency.is_some()
    }

    /// 是否携带任何参与浏览器指纹的信号
    pub fn has_browser_signals(&self) -> bool {
        self.canvas_signature.is_some()
            || self.webgl_signature.is_some()
            || self.audio_signature.is_some()
            || self.fonts.is_some()
            || self.storage_flags().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_keys_ignored() {
        let json = r#"{"screenWidth": 1920, "screenHeight": 1080, "somethingNew": true}"#;
        let bundle: ClientProbeBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.screen_width, Some(1920));
        assert_eq!(bundle.color_depth, None);
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let bundle: ClientProbeBundle = serde_json::from_str("{}").unwrap();
        assert!(!bundle.has_device_signals());
        assert!(!bundle.has_browser_signals());
        assert_eq!(bundle.screen_token(), None);
        assert_eq!(bundle.storage_flags(), None);
    }

    #[test]
    fn test_schema_version_gate() {
        let unversioned = ClientProbeBundle::default();
        assert!(unversioned.is_supported_version());

        let current = ClientProbeBundle {
            schema_version: Some(PROBE_SCHEMA_VERSION),
            ..Default::default()
        };
        assert!(current.is_supported_version());

        let future = ClientProbeBundle {
            schema_version: Some(PROBE_SCHEMA_VERSION + 1),
            ..Default::default()
        };
        assert!(!future.is_supported_version());
    }

    #[test]
    fn test_screen_token() {
        let bundle = ClientProbeBundle {
            screen_width: Some(1920),
            screen_height: Some(1080),
            color_depth: Some(24),
            ..Default::default()
        };
        assert_eq!(bundle.screen_token(), Some("1920x1080x24".to_string()));
    }

    #[test]
    fn test_timezone_token_falls_back_to_offset() {
        let named = ClientProbeBundle {
            timezone: Some("Asia/Shanghai".to_string()),
            timezone_offset_minutes: Some(-480),
            ..Default::default()
        };
        assert_eq!(named.timezone_token(), Some("Asia/Shanghai".to_string()));

        let offset_only = ClientProbeBundle {
            timezone_offset_minutes: Some(-480),
            ..Default::default()
        };
        assert_eq!(offset_only.timezone_token(), Some("utc-480".to_string()));
    }

    #[test]
    fn test_fonts_hash_order_independent() {
        let a = ClientProbeBundle {
            fonts: Some(vec!["Arial".to_string(), "Consolas".to_string()]),
            ..Default::default()
        };
        let b = ClientProbeBundle {
            fonts: Some(vec!["Consolas".to_string(), "Arial".to_string()]),
            ..Default::default()
        };
        assert_eq!(a.fonts_hash(), b.fonts_hash());
    }

    #[test]
    fn test_storage_flags_partial_probe() {
        let bundle = ClientProbeBundle {
            local_storage: Some(true),
            cookies_enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(bundle.storage_flags(), Some("1--0".to_string()));
    }
}
