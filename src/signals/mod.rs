//! 请求信号提取
//!
//! 从入站请求描述符中提取身份信号：规范化网络地址、解析 UserAgent、
//! 读取平台地理信息头。提取永不失败——缺失的信号只会降低指纹置信度。

pub mod probe;

use std::net::IpAddr;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use woothee::parser::Parser;
use xxhash_rust::xxh64::xxh64;

pub use probe::{ClientProbeBundle, PROBE_SCHEMA_VERSION};

/// 入站请求描述符（外层框架负责填充）
#[derive(Debug, Clone, Default)]
pub struct RequestSignals {
    /// 原始网络地址
    pub remote_addr: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub accept_language: Option<String>,
    /// 平台地理信息头（缺失即 None）
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// 解析后的 UserAgent 信息
#[derive(Debug, Clone, Default)]
pub struct ParsedUserAgent {
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub os_name: Option<String>,
    /// OS 家族（去版本），参与设备指纹
    pub os_family: Option<String>,
    pub device_category: Option<String>,
    pub is_bot: bool,
}

/// 提取后的身份信号
#[derive(Debug, Clone)]
pub struct ExtractedSignals {
    /// 规范化网络地址 token（回环地址统一收敛）
    pub ip_token: String,
    /// 加盐 xxHash64（16 hex），落库与指纹输入都用它
    pub net_hash: String,
    pub user_agent: Option<String>,
    pub ua: ParsedUserAgent,
    pub referrer: Option<String>,
    /// Accept-Language 首选语言
    pub language: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// 解析结果 memo：同一 UA 字符串在进程内只解析一次
static UA_CACHE: Lazy<DashMap<u64, ParsedUserAgent>> = Lazy::new(DashMap::new);

/// 从请求描述符提取身份信号
pub fn extract(signals: &RequestSignals) -> ExtractedSignals {
    let salt = &crate::config::get_config().fingerprint.salt;
    extract_with_salt(signals, salt)
}

/// 与 [`extract`] 相同，但显式传入加盐值
pub fn extract_with_salt(signals: &RequestSignals, salt: &str) -> ExtractedSignals {
    let ip_token = normalize_ip(&signals.remote_addr);
    let net_hash = salted_hash(salt, &ip_token);

    let ua = signals
        .user_agent
        .as_deref()
        .map(parse_user_agent)
        .unwrap_or_default();

    ExtractedSignals {
        ip_token,
        net_hash,
        user_agent: signals.user_agent.clone(),
        ua,
        referrer: signals.referer.clone(),
        language: signals.accept_language.as_deref().map(primary_language),
        country: signals.country.clone(),
        region: signals.region.clone(),
        city: signals.city.clone(),
    }
}

/// 规范化网络地址
///
/// 回环地址的各种写法（`::1`、`::ffff:127.0.0.1`、`127.0.0.1`）收敛到
/// 同一个 token，IPv4-mapped IPv6 展开为 IPv4，保证同机流量经不同网络栈
/// 观测时仍聚到一个设备指纹。
pub fn normalize_ip(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }

    match trimmed.parse::<IpAddr>() {
        Ok(ip) => {
            let ip = match ip {
                IpAddr::V6(v6) => v6
                    .to_ipv4_mapped()
                    .map(IpAddr::V4)
                    .unwrap_or(IpAddr::V6(v6)),
                v4 => v4,
            };
            if ip.is_loopback() {
                "localhost".to_string()
            } else {
                ip.to_string()
            }
        }
        // 解析失败时保留原始值（小写），仍可作为聚类 token
        Err(_) => trimmed.to_ascii_lowercase(),
    }
}

/// 计算加盐 xxHash64，返回 16 位 hex
#[inline]
pub fn salted_hash(salt: &str, value: &str) -> String {
    format!("{:016x}", xxh64(format!("{}:{}", salt, value).as_bytes(), 0))
}

/// 解析 UserAgent（带进程内 memo）
pub fn parse_user_agent(ua_string: &str) -> ParsedUserAgent {
    let key = xxh64(ua_string.as_bytes(), 0);
    if let Some(cached) = UA_CACHE.get(&key) {
        return cached.clone();
    }

    let parser = Parser::new();
    let result = parser.parse(ua_string).unwrap_or_default();

    let os_name = if result.os != "UNKNOWN" && !result.os.is_empty() {
        Some(result.os.to_string())
    } else {
        None
    };

    let parsed = ParsedUserAgent {
        browser_name: if result.name != "UNKNOWN" && !result.name.is_empty() {
            Some(result.name.to_string())
        } else {
            None
        },
        browser_version: if !result.version.is_empty() && result.version != "UNKNOWN" {
            Some(result.version.to_string())
        } else {
            None
        },
        os_family: os_name.as_deref().map(os_family),
        os_name,
        device_category: if !result.category.is_empty() {
            Some(result.category.to_string())
        } else {
            None
        },
        is_bot: result.category == "crawler",
    };

    UA_CACHE.insert(key, parsed.clone());
    parsed
}

/// 从 OS 名称归并出家族名（去版本号）
///
/// 设备指纹只使用家族：同一台机器上 "Windows 10" 与 "Windows 11" 的
/// UA 差异不应拆散设备簇。
pub fn os_family(os_name: &str) -> String {
    let lower = os_name.to_ascii_lowercase();
    if lower.starts_with("windows") {
        "Windows".to_string()
    } else if lower.contains("mac") {
        "macOS".to_string()
    } else if lower.starts_with("iphone") || lower.starts_with("ipad") || lower.starts_with("ipod")
    {
        "iOS".to_string()
    } else if lower.starts_with("android") {
        "Android".to_string()
    } else if lower.contains("linux") {
        "Linux".to_string()
    } else if lower.contains("chromeos") || lower.contains("chrome os") {
        "ChromeOS".to_string()
    } else {
        os_name.to_string()
    }
}

/// Accept-Language 首选语言（"zh-CN,zh;q=0.9" -> "zh-CN"）
fn primary_language(header: &str) -> String {
    header
        .split(',')
        .next()
        .unwrap_or(header)
        .split(';')
        .next()
        .unwrap_or(header)
        .trim()
        .to_string()
}
