//! Fingerprint generation
//!
//! Derives two independent xxHash64 fingerprints from extracted signals:
//!
//! - **device fingerprint** — signals expected to be stable across browsers
//!   on one physical machine (normalized network address, OS family,
//!   timezone, and — once client probes arrive — screen geometry and
//!   hardware concurrency);
//! - **browser fingerprint** — signals specific to one browser profile
//!   (full UA string, parsed browser name/version, rendering signatures,
//!   font list, storage capabilities).
//!
//! Generation never fails: missing signals are replaced by a placeholder
//! token, and a device fingerprint computed from server-observable signals
//! only is flagged `provisional` until the async enhancer upgrades it.

use xxhash_rust::xxh64::xxh64;

use crate::signals::{ClientProbeBundle, ExtractedSignals};

/// Domain separation seeds so device/browser hashes never collide even on
/// identical token lists.
const DEVICE_SEED: u64 = 0x6465_7669_6365_0001;
const BROWSER_SEED: u64 = 0x6272_6f77_7365_0001;

/// Placeholder for a missing signal
const MISSING: &str = "-";

/// Token separator (never appears in normalized tokens)
const SEP: &str = "\u{1f}";

/// The pair of fingerprints derived from one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintPair {
    /// 16-hex device fingerprint
    pub device: String,
    /// 16-hex browser fingerprint
    pub browser: String,
    /// True when the device fingerprint was computed from server
    /// signals only and should be treated as low-confidence
    pub provisional: bool,
}

/// Generate both fingerprints from extracted signals, optionally enriched
/// by a client probe bundle.
pub fn generate(extracted: &ExtractedSignals, probe: Option<&ClientProbeBundle>) -> FingerprintPair {
    let screen = probe.and_then(|p| p.screen_token());
    let timezone = probe.and_then(|p| p.timezone_token());
    let concurrency = probe.and_then(|p| p.hardware_concurrency);

    let device = device_fingerprint(
        &extracted.net_hash,
        extracted.ua.os_family.as_deref(),
        timezone.as_deref(),
        screen.as_deref(),
        concurrency.map(|c| c as i32),
    );

    let browser = browser_fingerprint(
        extracted.user_agent.as_deref(),
        extracted.ua.browser_name.as_deref(),
        extracted.ua.browser_version.as_deref(),
        probe,
    );

    FingerprintPair {
        device,
        browser,
        provisional: !probe.map(|p| p.has_device_signals()).unwrap_or(false),
    }
}

/// Device fingerprint over cross-browser-stable signals.
pub fn device_fingerprint(
    net_hash: &str,
    os_family: Option<&str>,
    timezone: Option<&str>,
    screen: Option<&str>,
    hardware_concurrency: Option<i32>,
) -> String {
    let concurrency = hardware_concurrency.map(|c| c.to_string());
    let tokens = [
        net_hash,
        os_family.unwrap_or(MISSING),
        timezone.unwrap_or(MISSING),
        screen.unwrap_or(MISSING),
        concurrency.as_deref().unwrap_or(MISSING),
    ];
    hash_tokens(&tokens, DEVICE_SEED)
}

/// Browser fingerprint over per-browser signals.
pub fn browser_fingerprint(
    user_agent: Option<&str>,
    browser_name: Option<&str>,
    browser_version: Option<&str>,
    probe: Option<&ClientProbeBundle>,
) -> String {
    let fonts_hash = probe.and_then(|p| p.fonts_hash());
    let storage_flags = probe.and_then(|p| p.storage_flags());
    let tokens = [
        user_agent.unwrap_or(MISSING),
        browser_name.unwrap_or(MISSING),
        browser_version.unwrap_or(MISSING),
        probe
            .and_then(|p| p.canvas_signature.as_deref())
            .unwrap_or(MISSING),
        probe
            .and_then(|p| p.webgl_signature.as_deref())
            .unwrap_or(MISSING),
        probe
            .and_then(|p| p.audio_signature.as_deref())
            .unwrap_or(MISSING),
        fonts_hash.as_deref().unwrap_or(MISSING),
        storage_flags.as_deref().unwrap_or(MISSING),
    ];
    hash_tokens(&tokens, BROWSER_SEED)
}

#[inline]
fn hash_tokens(tokens: &[&str], seed: u64) -> String {
    format!("{:016x}", xxh64(tokens.join(SEP).as_bytes(), seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{RequestSignals, extract_with_salt};

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX_WIN: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

    fn signals(addr: &str, ua: &str) -> RequestSignals {
        RequestSignals {
            remote_addr: addr.to_string(),
            user_agent: Some(ua.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_deterministic() {
        let extracted = extract_with_salt(&signals("203.0.113.7", CHROME_WIN), "s");
        let a = generate(&extracted, None);
        let b = generate(&extracted, None);
        assert_eq!(a, b);
        assert_eq!(a.device.len(), 16);
        assert_eq!(a.browser.len(), 16);
    }

    #[test]
    fn test_device_and_browser_hashes_independent() {
        let extracted = extract_with_salt(&signals("203.0.113.7", CHROME_WIN), "s");
        let pair = generate(&extracted, None);
        assert_ne!(pair.device, pair.browser);
    }

    #[test]
    fn test_loopback_variants_same_device_fingerprint() {
        let a = generate(&extract_with_salt(&signals("::1", CHROME_WIN), "s"), None);
        let b = generate(
            &extract_with_salt(&signals("127.0.0.1", CHROME_WIN), "s"),
            None,
        );
        let c = generate(
            &extract_with_salt(&signals("::ffff:127.0.0.1", CHROME_WIN), "s"),
            None,
        );
        assert_eq!(a.device, b.device);
        assert_eq!(b.device, c.device);
    }

    #[test]
    fn test_cross_browser_same_device() {
        // 同机不同浏览器：设备指纹相同，浏览器指纹不同
        let chrome = generate(
            &extract_with_salt(&signals("203.0.113.7", CHROME_WIN), "s"),
            None,
        );
        let firefox = generate(
            &extract_with_salt(&signals("203.0.113.7", FIREFOX_WIN), "s"),
            None,
        );
        assert_eq!(chrome.device, firefox.device);
        assert_ne!(chrome.browser, firefox.browser);
    }

    #[test]
    fn test_missing_ua_still_hashes() {
        let extracted = extract_with_salt(
            &RequestSignals {
                remote_addr: "203.0.113.7".to_string(),
                ..Default::default()
            },
            "s",
        );
        let pair = generate(&extracted, None);
        assert_eq!(pair.device.len(), 16);
        assert!(pair.provisional);
    }

    #[test]
    fn test_probe_upgrades_provisional() {
        let extracted = extract_with_salt(&signals("203.0.113.7", CHROME_WIN), "s");
        let probe = ClientProbeBundle {
            screen_width: Some(2560),
            screen_height: Some(1440),
            color_depth: Some(24),
            timezone: Some("Asia/Shanghai".to_string()),
            hardware_concurrency: Some(8),
            ..Default::default()
        };

        let before = generate(&extracted, None);
        let after = generate(&extracted, Some(&probe));

        assert!(before.provisional);
        assert!(!after.provisional);
        assert_ne!(before.device, after.device);
    }
}
