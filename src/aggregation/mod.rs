//! 点击聚合引擎
//!
//! 按时间桶产出 total/unique 两条序列：total 数事件行，unique 数
//! 设备簇。序列是稠密的——窗口内没有点击的桶显式输出零值。

mod reconcile;

pub use reconcile::{LinkCounters, reconcile_link_counters};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc};

use crate::correlation::{Confidence, resolve_in_snapshot};
use crate::errors::{LinksightError, Result};
use crate::storage::SeaOrmStorage;
use migration::entities::short_link;

/// 单次查询允许产出的最大桶数
const MAX_SERIES_POINTS: usize = 10_000;

/// 聚合时间粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
    Week,
    Month,
}

impl Bucket {
    pub fn parse(s: &str) -> Result<Bucket> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(Bucket::Hour),
            "day" => Ok(Bucket::Day),
            "week" => Ok(Bucket::Week),
            "month" => Ok(Bucket::Month),
            other => Err(LinksightError::validation(format!(
                "未知聚合粒度: {}（支持 hour/day/week/month）",
                other
            ))),
        }
    }

    /// 对齐到桶起点（周桶对齐到 ISO 周一）
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            Bucket::Hour => midnight + Duration::hours(ts.hour() as i64),
            Bucket::Day => midnight,
            Bucket::Week => {
                midnight - Duration::days(ts.weekday().num_days_from_monday() as i64)
            }
            Bucket::Month => ts
                .date_naive()
                .with_day(1)
                .unwrap_or_else(|| ts.date_naive())
                .and_time(NaiveTime::MIN)
                .and_utc(),
        }
    }

    /// 下一个桶的起点
    pub fn advance(&self, bucket_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Bucket::Hour => bucket_start + Duration::hours(1),
            Bucket::Day => bucket_start + Duration::days(1),
            Bucket::Week => bucket_start + Duration::days(7),
            Bucket::Month => bucket_start
                .checked_add_months(Months::new(1))
                .unwrap_or(bucket_start + Duration::days(31)),
        }
    }

    /// 桶标签（周桶使用 ISO 周编号）
    pub fn label(&self, bucket_start: DateTime<Utc>) -> String {
        match self {
            Bucket::Hour => bucket_start.format("%Y-%m-%d %H:00").to_string(),
            Bucket::Day => bucket_start.format("%Y-%m-%d").to_string(),
            Bucket::Week => bucket_start.format("%G-W%V").to_string(),
            Bucket::Month => bucket_start.format("%Y-%m").to_string(),
        }
    }
}

/// 序列中的一个时间桶
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub bucket_start: DateTime<Utc>,
    pub total_clicks: i64,
    pub unique_clicks: i64,
}

/// 一条链接的聚合结果
#[derive(Debug, Clone, serde::Serialize)]
pub struct LinkSeries {
    pub short_code: String,
    pub points: Vec<SeriesPoint>,
    /// 链接维护的累计计数器
    pub total_clicks: i64,
    pub unique_visitors: i64,
    /// 查询窗口内的去重设备簇数
    pub range_unique: i64,
}

/// 解析日期参数（RFC3339 或 %Y-%m-%d），缺省为最近 30 天
pub fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end_ts = match end {
        Some(s) => parse_date(s, true)?,
        None => Utc::now(),
    };
    let start_ts = match start {
        Some(s) => parse_date(s, false)?,
        None => end_ts - Duration::days(30),
    };
    validate_range(start_ts, end_ts)?;
    Ok((start_ts, end_ts))
}

fn parse_date(s: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        LinksightError::analytics_invalid_date_range(format!(
            "无法解析日期 '{}'（支持 RFC3339 或 YYYY-MM-DD）",
            s
        ))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::MIN
    };
    Ok(date.and_time(time).and_utc())
}

fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end < start {
        return Err(LinksightError::analytics_invalid_date_range(
            "结束时间早于开始时间".to_string(),
        ));
    }
    for ts in [start, end] {
        if !(1970..=9999).contains(&ts.year()) {
            return Err(LinksightError::analytics_invalid_date_range(format!(
                "日期超出支持范围: {}",
                ts
            )));
        }
    }
    Ok(())
}

/// 聚合引擎
#[derive(Clone)]
pub struct AggregationEngine {
    storage: Arc<SeaOrmStorage>,
    min_confidence: Confidence,
}

impl AggregationEngine {
    /// 构造引擎，unique 口径的置信度阈值取自配置
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let config = crate::config::get_config();
        Self {
            storage,
            min_confidence: Confidence::parse(&config.aggregation.min_confidence),
        }
    }

    pub fn with_min_confidence(storage: Arc<SeaOrmStorage>, min_confidence: Confidence) -> Self {
        Self {
            storage,
            min_confidence,
        }
    }

    /// 时间窗内的点击序列
    pub async fn link_series(
        &self,
        short_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket: Bucket,
    ) -> Result<LinkSeries> {
        let link = self
            .storage
            .get_link(short_code)
            .await?
            .ok_or_else(|| LinksightError::not_found(short_code))?;
        validate_range(start, end)?;
        self.series_between(&link, start, end, bucket).await
    }

    /// 从链接创建起到当前时刻的全量序列
    ///
    /// 零点击的链接也至少产出一个零值桶。
    pub async fn all_time_series(&self, short_code: &str, bucket: Bucket) -> Result<LinkSeries> {
        let link = self
            .storage
            .get_link(short_code)
            .await?
            .ok_or_else(|| LinksightError::not_found(short_code))?;
        let start = link.created_at;
        let end = Utc::now().max(start);
        self.series_between(&link, start, end, bucket).await
    }

    async fn series_between(
        &self,
        link: &short_link::Model,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket: Bucket,
    ) -> Result<LinkSeries> {
        let rows = self
            .storage
            .fetch_click_rows(&link.short_code, start, end)
            .await
            .map_err(|e| {
                LinksightError::analytics_query_failed(format!("点击事件扫描失败: {}", e))
            })?;

        let correlations: HashMap<_, _> = self
            .storage
            .load_correlations(&link.short_code)
            .await
            .map_err(|e| {
                LinksightError::analytics_query_failed(format!("关联快照加载失败: {}", e))
            })?
            .into_iter()
            .map(|row| (row.browser_fingerprint.clone(), row))
            .collect();

        let mut totals: BTreeMap<DateTime<Utc>, i64> = BTreeMap::new();
        let mut bucket_clusters: HashMap<DateTime<Utc>, HashSet<String>> = HashMap::new();
        let mut range_clusters: HashSet<String> = HashSet::new();

        for row in &rows {
            let cluster =
                resolve_in_snapshot(&correlations, &row.browser_fingerprint, self.min_confidence);
            let bucket_start = bucket.truncate(row.clicked_at);
            *totals.entry(bucket_start).or_insert(0) += 1;
            bucket_clusters
                .entry(bucket_start)
                .or_default()
                .insert(cluster.clone());
            range_clusters.insert(cluster);
        }

        // 稠密序列：无点击的桶输出零值
        let mut points = Vec::new();
        let last = bucket.truncate(end);
        let mut cursor = bucket.truncate(start);
        while cursor <= last {
            if points.len() >= MAX_SERIES_POINTS {
                return Err(LinksightError::analytics_invalid_date_range(format!(
                    "时间窗对所选粒度过宽（桶数上限 {}）",
                    MAX_SERIES_POINTS
                )));
            }
            let total = totals.get(&cursor).copied().unwrap_or(0);
            let unique = bucket_clusters
                .get(&cursor)
                .map(|set| set.len() as i64)
                .unwrap_or(0)
                .min(total);
            points.push(SeriesPoint {
                label: bucket.label(cursor),
                bucket_start: cursor,
                total_clicks: total,
                unique_clicks: unique,
            });
            cursor = bucket.advance(cursor);
        }

        Ok(LinkSeries {
            short_code: link.short_code.clone(),
            points,
            total_clicks: link.total_clicks,
            unique_visitors: link.unique_visitors,
            range_unique: range_clusters.len() as i64,
        })
    }
}
