//! 端到端分析流程测试（SQLite 临时库）

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use linksight::aggregation::{AggregationEngine, Bucket, reconcile_link_counters};
use linksight::correlation::{Confidence, CorrelationStore};
use linksight::enhancer::Enhancer;
use linksight::recorder::ClickRecorder;
use linksight::signals::{ClientProbeBundle, RequestSignals, extract};
use linksight::storage::{NewClickEvent, SeaOrmStorage};
use linksight::{fingerprint, signals};

const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const FIREFOX_WIN: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static DB_SEQ: AtomicU32 = AtomicU32::new(0);

async fn setup() -> Arc<SeaOrmStorage> {
    let path = std::env::temp_dir().join(format!(
        "linksight-test-{}-{}.db",
        std::process::id(),
        DB_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&path);
    let url = format!("sqlite://{}", path.display());
    Arc::new(SeaOrmStorage::new(&url, "sqlite").await.unwrap())
}

fn click(addr: &str, ua: &str) -> RequestSignals {
    RequestSignals {
        remote_addr: addr.to_string(),
        user_agent: Some(ua.to_string()),
        ..Default::default()
    }
}

fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

fn browser_fp(addr: &str, ua: &str) -> String {
    fingerprint::generate(&extract(&click(addr, ua)), None).browser
}

#[tokio::test]
async fn test_cross_browser_clicks_count_one_visitor() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());

    recorder.record("abc", &click("203.0.113.7", CHROME_WIN)).await.unwrap();
    recorder.record("abc", &click("203.0.113.7", FIREFOX_WIN)).await.unwrap();

    let link = storage.get_link("abc").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 2);
    assert_eq!(link.unique_visitors, 1);
}

#[tokio::test]
async fn test_distinct_devices_count_separately() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());

    recorder.record("abc", &click("203.0.113.7", CHROME_WIN)).await.unwrap();
    recorder.record("abc", &click("198.51.100.9", CHROME_MAC)).await.unwrap();

    let link = storage.get_link("abc").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 2);
    assert_eq!(link.unique_visitors, 2);
}

#[tokio::test]
async fn test_loopback_variants_converge_to_one_visitor() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());

    recorder.record("abc", &click("::1", CHROME_WIN)).await.unwrap();
    recorder.record("abc", &click("127.0.0.1", FIREFOX_WIN)).await.unwrap();
    recorder.record("abc", &click("::ffff:127.0.0.1", CHROME_WIN)).await.unwrap();

    let link = storage.get_link("abc").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 3);
    assert_eq!(link.unique_visitors, 1);
}

#[tokio::test]
async fn test_repeat_visit_only_touches_correlation() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let correlations = CorrelationStore::new(storage.clone());

    let t1 = ts(2025, 3, 1, 10);
    let t2 = ts(2025, 3, 2, 10);

    let first = correlations.learn("abc", "fp-a", "dev-1", false, t1).await.unwrap();
    assert!(!first.previously_seen);
    assert_eq!(first.cluster_id, "fp-a");
    assert_eq!(first.confidence, Confidence::Inherent);

    let second = correlations.learn("abc", "fp-a", "dev-1", false, t2).await.unwrap();
    assert!(second.previously_seen);
    assert_eq!(second.cluster_id, "fp-a");

    let rows = storage.load_correlations("abc").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].first_correlated, t1);
    assert_eq!(rows[0].last_confirmed, t2);
}

#[tokio::test]
async fn test_daily_series_dense_with_cluster_dedup() {
    let storage = setup().await;
    storage
        .create_link("jan", "https://example.com", ts(2025, 1, 1, 0))
        .await
        .unwrap();

    // 1 月 2 日三次点击：fp-a 与 fp-b 同设备，fp-c 独立设备
    for (fp, hour) in [("fp-a", 9), ("fp-b", 10), ("fp-c", 11)] {
        storage
            .insert_click_event(NewClickEvent {
                short_code: "jan".to_string(),
                clicked_at: ts(2025, 1, 2, hour),
                referrer: None,
                ip_hash: None,
                country: None,
                region: None,
                city: None,
                browser_name: None,
                os_name: None,
                device_category: None,
                browser_fingerprint: fp.to_string(),
            })
            .await
            .unwrap();
    }
    storage
        .insert_correlation("jan", "fp-a", "fp-a", "self", "inherent", ts(2025, 1, 2, 9))
        .await
        .unwrap();
    storage
        .insert_correlation("jan", "fp-b", "fp-a", "device_match", "medium", ts(2025, 1, 2, 10))
        .await
        .unwrap();
    storage
        .insert_correlation("jan", "fp-c", "fp-c", "self", "inherent", ts(2025, 1, 2, 11))
        .await
        .unwrap();

    let counters = reconcile_link_counters(&storage, "jan").await.unwrap();
    assert_eq!(counters.total_clicks, 3);
    assert_eq!(counters.unique_visitors, 2);

    let engine = AggregationEngine::with_min_confidence(storage.clone(), Confidence::Medium);
    let series = engine
        .link_series("jan", ts(2025, 1, 1, 0), ts(2025, 1, 31, 23), Bucket::Day)
        .await
        .unwrap();

    assert_eq!(series.points.len(), 31);
    assert_eq!(series.total_clicks, 3);
    assert_eq!(series.unique_visitors, 2);
    assert_eq!(series.range_unique, 2);

    let jan2 = &series.points[1];
    assert_eq!(jan2.label, "2025-01-02");
    assert_eq!(jan2.total_clicks, 3);
    assert_eq!(jan2.unique_clicks, 2);

    // 其余桶显式零值，序列总和与计数器一致
    let sum: i64 = series.points.iter().map(|p| p.total_clicks).sum();
    assert_eq!(sum, 3);
    for (i, point) in series.points.iter().enumerate() {
        if i != 1 {
            assert_eq!(point.total_clicks, 0);
            assert_eq!(point.unique_clicks, 0);
        }
        assert!(point.unique_clicks <= point.total_clicks);
    }

    // 抬高置信度阈值后 medium 关联被忽略，三个指纹各算一簇
    let strict = AggregationEngine::with_min_confidence(storage.clone(), Confidence::High);
    let series = strict
        .link_series("jan", ts(2025, 1, 1, 0), ts(2025, 1, 31, 23), Bucket::Day)
        .await
        .unwrap();
    assert_eq!(series.points[1].unique_clicks, 3);
    assert_eq!(series.range_unique, 3);
}

#[tokio::test]
async fn test_all_time_series_zero_clicks_has_one_bucket() {
    let storage = setup().await;
    storage.create_link("empty", "https://example.com", Utc::now()).await.unwrap();

    let engine = AggregationEngine::with_min_confidence(storage.clone(), Confidence::Medium);
    let series = engine.all_time_series("empty", Bucket::Day).await.unwrap();

    assert!(!series.points.is_empty());
    for point in &series.points {
        assert_eq!(point.total_clicks, 0);
        assert_eq!(point.unique_clicks, 0);
    }
    assert_eq!(series.total_clicks, 0);
}

#[tokio::test]
async fn test_series_for_unknown_link_is_not_found() {
    let storage = setup().await;
    let engine = AggregationEngine::with_min_confidence(storage, Confidence::Medium);
    let err = engine.all_time_series("missing", Bucket::Day).await.unwrap_err();
    assert_eq!(err.code(), "E006");
}

#[tokio::test]
async fn test_dispatch_swallows_storage_failures() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());

    use sea_orm::ConnectionTrait;
    storage
        .get_db()
        .execute_unprepared("DROP TABLE click_events")
        .await
        .unwrap();

    recorder.dispatch("abc", click("203.0.113.7", CHROME_WIN));
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // 记录失败被吞掉，计数器不变
    let link = storage.get_link("abc").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 0);
}

#[tokio::test]
async fn test_probe_bundle_for_unknown_profile_is_noop() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let enhancer = Enhancer::new(storage.clone());

    enhancer
        .enhance("abc", "deadbeefdeadbeef", &ClientProbeBundle::default())
        .await
        .unwrap();

    assert!(storage.load_correlations("abc").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enhancement_merges_clusters_and_reconciles() {
    let storage = setup().await;
    storage.create_link("m", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());
    let enhancer = Enhancer::new(storage.clone());

    let probe = ClientProbeBundle {
        screen_width: Some(2560),
        screen_height: Some(1440),
        color_depth: Some(24),
        timezone: Some("Asia/Shanghai".to_string()),
        hardware_concurrency: Some(8),
        ..Default::default()
    };

    // Chrome 点击并完成增强：档案里的设备指纹升级为全量信号版本
    recorder.record("m", &click("203.0.113.7", CHROME_WIN)).await.unwrap();
    let chrome_fp = browser_fp("203.0.113.7", CHROME_WIN);
    enhancer.enhance("m", &chrome_fp, &probe).await.unwrap();

    let chrome_profile = storage.find_profile("m", &chrome_fp).await.unwrap().unwrap();
    assert!(chrome_profile.enhanced);

    // Firefox 点击：临时设备指纹已匹配不上升级后的 Chrome 档案，自成一簇
    recorder.record("m", &click("203.0.113.7", FIREFOX_WIN)).await.unwrap();
    let link = storage.get_link("m").await.unwrap().unwrap();
    assert_eq!(link.unique_visitors, 2);

    // Firefox 上报同样的探测包：设备指纹收敛，两簇合并，计数器对账
    let firefox_fp = browser_fp("203.0.113.7", FIREFOX_WIN);
    enhancer.enhance("m", &firefox_fp, &probe).await.unwrap();

    let link = storage.get_link("m").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 2);
    assert_eq!(link.unique_visitors, 1);

    // 败者关联被改挂到先建立的簇
    let firefox_corr = storage.find_correlation("m", &firefox_fp).await.unwrap().unwrap();
    assert_eq!(firefox_corr.device_cluster_id, chrome_fp);
    assert_eq!(firefox_corr.method, "merge");

    // 重复投递同一探测包（任意顺序）：合并幂等，计数与关联均不变
    enhancer.enhance("m", &firefox_fp, &probe).await.unwrap();
    enhancer.enhance("m", &chrome_fp, &probe).await.unwrap();
    enhancer.enhance("m", &firefox_fp, &probe).await.unwrap();

    let link = storage.get_link("m").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 2);
    assert_eq!(link.unique_visitors, 1);

    let rows = storage.load_correlations("m").await.unwrap();
    assert_eq!(rows.len(), 2);
    let firefox_corr = storage.find_correlation("m", &firefox_fp).await.unwrap().unwrap();
    assert_eq!(firefox_corr.device_cluster_id, chrome_fp);
    let chrome_corr = storage.find_correlation("m", &chrome_fp).await.unwrap().unwrap();
    assert_eq!(chrome_corr.device_cluster_id, chrome_fp);
}

#[tokio::test]
async fn test_future_schema_probe_bundle_is_dropped() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());
    let enhancer = Enhancer::new(storage.clone());

    recorder.record("abc", &click("203.0.113.7", CHROME_WIN)).await.unwrap();
    let fp = browser_fp("203.0.113.7", CHROME_WIN);

    let bundle = ClientProbeBundle {
        schema_version: Some(linksight::signals::PROBE_SCHEMA_VERSION + 1),
        screen_width: Some(1920),
        screen_height: Some(1080),
        timezone: Some("Asia/Shanghai".to_string()),
        ..Default::default()
    };
    enhancer.enhance("abc", &fp, &bundle).await.unwrap();

    // 更高版本的包整包丢弃，档案保持未增强
    let profile = storage.find_profile("abc", &fp).await.unwrap().unwrap();
    assert!(!profile.enhanced);
    assert!(profile.screen.is_none());
    assert!(profile.probe_json.is_none());
}

#[tokio::test]
async fn test_reset_link_stats_clears_everything() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());
    recorder.record("abc", &click("203.0.113.7", CHROME_WIN)).await.unwrap();

    storage.reset_link_stats("abc").await.unwrap();

    let link = storage.get_link("abc").await.unwrap().unwrap();
    assert_eq!(link.total_clicks, 0);
    assert_eq!(link.unique_visitors, 0);
    assert_eq!(storage.count_click_events("abc").await.unwrap(), 0);
    assert!(storage.load_correlations("abc").await.unwrap().is_empty());
    assert!(
        storage
            .find_profile("abc", &browser_fp("203.0.113.7", CHROME_WIN))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_signals_flow_into_click_rows() {
    let storage = setup().await;
    storage.create_link("abc", "https://example.com", Utc::now()).await.unwrap();
    let recorder = ClickRecorder::new(storage.clone());

    let mut signals = click("203.0.113.7", CHROME_WIN);
    signals.referer = Some("https://news.example/".to_string());
    signals.country = Some("JP".to_string());
    recorder.record("abc", &signals).await.unwrap();

    let start = Utc::now() - chrono::Duration::hours(1);
    let end = Utc::now() + chrono::Duration::hours(1);
    let rows = storage.fetch_click_rows("abc", start, end).await.unwrap();
    assert_eq!(rows.len(), 1);

    let expected = signals::extract(&signals);
    let pair = fingerprint::generate(&expected, None);
    assert_eq!(rows[0].browser_fingerprint, pair.browser);
}
