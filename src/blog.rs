//! Blog channel: posts, weekly metrics, campaigns and the KPI cards built on them.

use crate::errors::StoreError;
use crate::format::{format_delta, format_kpi, format_percent};
use crate::models::{
    ActiveCampaignResponse, BenchmarkRanking, BlogKpiResponse, BlogPost, BlogWeeklyMetric,
    Campaign, CampaignItem,
    CampaignStatusKpi, CampaignStatusResponse, CampaignSummary, CampaignTarget, ChartPoint,
    ConversionKpiResponse, DatedRecord, FormattedKpi, KpiResult, PeriodType, PlaceConversionKpi,
    RankingTrendPoint, SearchInflowKpi, Subject, WindowKpiResponse,
};
use crate::schema::{
    self, CONVERSION_RATE, CONVERSIONS, INFLOW, PLACE_CLICKS, POST_ID_TAG, TOP_KEYWORDS_TAG,
    VIEWS, tables,
};
use crate::stats::{
    self, Granularity, GroupSpec, date_key, delta, filter_records, group_records,
    percent_change, ratio_percent, round_to, subject_matches, sum_window, week_start,
};
use crate::store::{ListQuery, RecordStore, SortDirection};
use chrono::{Duration, Local, NaiveDate};
use std::collections::BTreeMap;

/// Weekly chart series are cut to this many most recent points.
pub const WEEKLY_CHART_POINTS: usize = 12;
/// Length of each comparison window for search inflow and place conversion.
const KPI_WINDOW_DAYS: i64 = 28;
const TOP_N: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<String>,
    pub subject: Option<Subject>,
    pub date_range: Option<(String, String)>,
}

impl PostFilter {
    fn accepts(&self, post: &BlogPost) -> bool {
        if self.status.as_ref().is_some_and(|s| s != &post.status) {
            return false;
        }
        if let Some(subject) = self.subject.filter(|s| *s != Subject::All) {
            if post.subject != subject.label() {
                return false;
            }
        }
        if let Some((start, end)) = &self.date_range {
            let date = post.publish_date.as_str();
            if date < start.as_str() || date > end.as_str() {
                return false;
            }
        }
        true
    }
}

pub async fn blog_posts(store: &dyn RecordStore, filter: &PostFilter) -> Result<Vec<BlogPost>, StoreError> {
    let rows = store
        .list(
            tables::BLOG_POSTS,
            &ListQuery::all().sort("Publish Date", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::blog_post)
        .into_iter()
        .filter(|post| filter.accepts(post))
        .collect())
}

pub async fn weekly_metrics(store: &dyn RecordStore) -> Result<Vec<DatedRecord>, StoreError> {
    let rows = store
        .list(
            tables::BLOG_WEEKLY_METRICS,
            &ListQuery::all().sort("Week Start", SortDirection::Asc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::weekly_metric_record))
}

pub async fn campaigns(store: &dyn RecordStore) -> Result<Vec<Campaign>, StoreError> {
    let rows = store
        .list(
            tables::BLOG_CAMPAIGNS,
            &ListQuery::all().sort("Period Start", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::campaign))
}

pub async fn campaign_targets(store: &dyn RecordStore) -> Result<Vec<CampaignTarget>, StoreError> {
    let rows = store
        .list(
            tables::CAMPAIGN_TARGETS,
            &ListQuery::all().sort("Publish Date", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::campaign_target))
}

/// Time series of summed weekly metrics for one subject.
pub fn chart_points(records: &[DatedRecord], period: PeriodType, subject: Subject) -> Vec<ChartPoint> {
    let selected = filter_records(records.to_vec(), subject_matches(subject));
    let spec = GroupSpec::new(Granularity::from(period)).sum(&[VIEWS, INFLOW, PLACE_CLICKS, CONVERSIONS]);

    group_records(&selected, &spec)
        .into_iter()
        .filter(|bucket| bucket.sum(VIEWS) > 0.0 || bucket.sum(INFLOW) > 0.0)
        .map(|bucket| {
            let date = match period {
                PeriodType::Weekly => bucket.key.clone(),
                PeriodType::Monthly => format!("{}-01", bucket.key),
            };
            ChartPoint {
                date,
                views: bucket.sum(VIEWS),
                inflow: bucket.sum(INFLOW),
                place_clicks: bucket.sum(PLACE_CLICKS),
                conversion_rate: round_to(ratio_percent(bucket.sum(CONVERSIONS), bucket.sum(INFLOW)), 2),
            }
        })
        .collect()
}

pub async fn chart_data(
    store: &dyn RecordStore,
    period: PeriodType,
    subject: Subject,
) -> Result<Vec<ChartPoint>, StoreError> {
    let records = weekly_metrics(store).await?;
    let mut points = chart_points(&records, period, subject);
    if period == PeriodType::Weekly && points.len() > WEEKLY_CHART_POINTS {
        points.drain(..points.len() - WEEKLY_CHART_POINTS);
    }
    Ok(points)
}

pub async fn blog_kpi(
    store: &dyn RecordStore,
    date_range: Option<(String, String)>,
) -> Result<BlogKpiResponse, StoreError> {
    blog_kpi_at(store, date_range, Local::now().date_naive()).await
}

/// KPI cards comparing the last two complete weeks before `today`.
pub async fn blog_kpi_at(
    store: &dyn RecordStore,
    date_range: Option<(String, String)>,
    today: NaiveDate,
) -> Result<BlogKpiResponse, StoreError> {
    let filter = PostFilter {
        date_range,
        ..PostFilter::default()
    };
    let (posts, metrics) = tokio::try_join!(blog_posts(store, &filter), weekly_metrics(store))?;

    let campaign_status = CampaignStatusKpi {
        active: posts.iter().filter(|p| p.status == "정상").count(),
        total: posts.len(),
        warning_count: posts.iter().filter(|p| p.status == "순위하락").count(),
    };

    let current_week = date_key(week_start(today));
    let complete: Vec<DatedRecord> = metrics
        .into_iter()
        .filter(|record| {
            stats::parse_date(&record.date)
                .is_some_and(|date| date_key(week_start(date)) < current_week)
        })
        .collect();

    let spec = GroupSpec::new(Granularity::Week).sum(&[INFLOW, PLACE_CLICKS]);
    let buckets = group_records(&complete, &spec);

    let inflow = delta(&buckets, INFLOW);
    let latest_key = buckets.last().map(|b| b.key.clone());
    let latest: Vec<&DatedRecord> = complete
        .iter()
        .filter(|record| {
            stats::parse_date(&record.date)
                .map(|date| date_key(week_start(date)))
                .is_some_and(|key| Some(&key) == latest_key.as_ref())
        })
        .collect();

    let rates: Vec<f64> = buckets
        .iter()
        .map(|b| round_to(ratio_percent(b.sum(PLACE_CLICKS), b.sum(INFLOW)), 1))
        .collect();
    let rate = rates.last().copied().unwrap_or(0.0);
    let previous_rate = rates.iter().rev().nth(1).copied().unwrap_or(0.0);
    let rate_change = percent_change(rate, previous_rate);

    Ok(BlogKpiResponse {
        campaign_status,
        search_inflow: SearchInflowKpi {
            total: inflow.value,
            change_rate: inflow.delta_percent,
            top_keywords: top_keywords(&latest),
            display: format_kpi(&inflow),
        },
        place_conversion: PlaceConversionKpi {
            rate,
            change_rate: rate_change,
            top_posts: top_posts(&latest, &posts),
            display: FormattedKpi {
                value: format_percent(rate),
                delta: format_delta(rate_change as f64),
            },
        },
    })
}

/// Most frequent keywords, ties broken alphabetically.
fn top_keywords(records: &[&DatedRecord]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        if let Some(raw) = record.tags.get(TOP_KEYWORDS_TAG) {
            for keyword in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                *counts.entry(keyword).or_insert(0) += 1;
            }
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.into_iter().take(TOP_N).map(|(k, _)| k.to_string()).collect()
}

fn top_posts(records: &[&DatedRecord], posts: &[BlogPost]) -> Vec<String> {
    let mut ranked: Vec<&&DatedRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        b.metric_value(CONVERSION_RATE)
            .total_cmp(&a.metric_value(CONVERSION_RATE))
    });
    ranked
        .into_iter()
        .filter_map(|record| {
            let post_id = record.tags.get(POST_ID_TAG)?;
            posts
                .iter()
                .find(|post| &post.post_id == post_id)
                .map(|post| post.post_title.clone())
        })
        .filter(|title| !title.is_empty())
        .take(TOP_N)
        .collect()
}

fn kpi_windows(today: NaiveDate) -> ((NaiveDate, NaiveDate), (NaiveDate, NaiveDate)) {
    let start = today - Duration::days(KPI_WINDOW_DAYS);
    let previous_start = start - Duration::days(KPI_WINDOW_DAYS);
    ((start, today), (previous_start, start))
}

pub async fn search_inflow_at(
    store: &dyn RecordStore,
    subject: Subject,
    today: NaiveDate,
) -> Result<WindowKpiResponse, StoreError> {
    let records = filter_records(weekly_metrics(store).await?, subject_matches(subject));
    let ((start, end), (previous_start, previous_end)) = kpi_windows(today);

    let current = sum_window(&records, INFLOW, start, end);
    let previous = sum_window(&records, INFLOW, previous_start, previous_end);
    let change = percent_change(current, previous);

    Ok(WindowKpiResponse {
        total: current,
        change_rate: change,
        display: format_kpi(&KpiResult {
            value: current,
            delta_percent: change,
        }),
    })
}

pub async fn place_conversion_at(
    store: &dyn RecordStore,
    subject: Subject,
    today: NaiveDate,
) -> Result<ConversionKpiResponse, StoreError> {
    let records = filter_records(weekly_metrics(store).await?, subject_matches(subject));
    let ((start, end), (previous_start, previous_end)) = kpi_windows(today);

    let rate_between = |from: NaiveDate, to: NaiveDate| {
        let clicks = sum_window(&records, PLACE_CLICKS, from, to);
        let inflow = sum_window(&records, INFLOW, from, to);
        round_to(ratio_percent(clicks, inflow), 1)
    };
    let rate = rate_between(start, end);
    let change = percent_change(rate, rate_between(previous_start, previous_end));

    Ok(ConversionKpiResponse {
        rate,
        change_rate: change,
        display: FormattedKpi {
            value: format_percent(rate),
            delta: format_delta(change as f64),
        },
    })
}

/// Campaign running on `today`, else the one that started last.
fn pick_campaign(mut campaigns: Vec<Campaign>, today: NaiveDate) -> Option<Campaign> {
    let today = date_key(today);
    let running = campaigns.iter().position(|c| {
        !c.period_start.is_empty()
            && c.period_start.as_str() <= today.as_str()
            && (c.period_end.is_empty() || today.as_str() <= c.period_end.as_str())
    });
    match running {
        Some(index) => Some(campaigns.swap_remove(index)),
        None => campaigns.into_iter().max_by(|a, b| a.period_start.cmp(&b.period_start)),
    }
}

pub fn campaign_progress(campaign: Campaign, targets: &[CampaignTarget]) -> ActiveCampaignResponse {
    let mut items: Vec<CampaignItem> = targets
        .iter()
        .filter(|t| !campaign.campaign_id.is_empty() && t.campaign_id == campaign.campaign_id)
        .map(|target| CampaignItem {
            date: target.publish_date.clone(),
            post_id: target.post_id.clone(),
            title: target.post_title.clone(),
            keywords: target.keywords.clone(),
            target_inflow: target.target_inflow,
            achieved_inflow: target.achieved_inflow,
            progress_percent: round_to(ratio_percent(target.achieved_inflow, target.target_inflow), 1),
            rank: target.rank,
            seo_score: target.seo_score,
            legal_status: target.legal_status.clone(),
            post_type: target.post_type.clone(),
        })
        .collect();
    items.sort_by(|a, b| a.date.cmp(&b.date));

    let target_inflow: f64 = items.iter().map(|i| i.target_inflow).sum();
    let achieved_inflow: f64 = items.iter().map(|i| i.achieved_inflow).sum();

    ActiveCampaignResponse {
        campaign: CampaignSummary {
            id: campaign.id,
            name: campaign.name,
            period_start: campaign.period_start,
            period_end: campaign.period_end,
            subject_cluster: campaign.subject_cluster,
        },
        target_inflow,
        achieved_inflow,
        progress_percent: round_to(ratio_percent(achieved_inflow, target_inflow), 1),
        items,
    }
}

pub async fn active_campaign_at(
    store: &dyn RecordStore,
    today: NaiveDate,
) -> Result<Option<ActiveCampaignResponse>, StoreError> {
    let (campaigns, targets) = tokio::try_join!(campaigns(store), campaign_targets(store))?;
    Ok(pick_campaign(campaigns, today).map(|campaign| campaign_progress(campaign, &targets)))
}

pub async fn campaign_status(store: &dyn RecordStore) -> Result<CampaignStatusResponse, StoreError> {
    let (campaigns, targets) = tokio::try_join!(campaigns(store), campaign_targets(store))?;
    Ok(CampaignStatusResponse {
        normal_count: targets.iter().filter(|t| t.status == "normal").count(),
        total_count: targets.len(),
        current_campaign_name: campaigns
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "진행 중인 캠페인 없음".to_string()),
    })
}

/// Weekly metric rows, newest week first, optionally narrowed to one post or week.
pub async fn weekly_metric_rows(
    store: &dyn RecordStore,
    post_id: Option<&str>,
    week_start: Option<&str>,
) -> Result<Vec<BlogWeeklyMetric>, StoreError> {
    let rows = store
        .list(
            tables::BLOG_WEEKLY_METRICS,
            &ListQuery::all().sort("Week Start", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::blog_weekly_metric)
        .into_iter()
        .filter(|m| post_id.is_none_or(|id| m.post_id == id))
        .filter(|m| week_start.is_none_or(|week| m.week_start == week))
        .collect())
}

/// Competitor rankings per keyword and week, newest week first.
pub async fn benchmark_rankings(
    store: &dyn RecordStore,
    keyword: Option<&str>,
    week_start: Option<&str>,
) -> Result<Vec<BenchmarkRanking>, StoreError> {
    let rows = store
        .list(
            tables::BLOG_WEEKLY_RANKINGS,
            &ListQuery::all().sort("Week Start", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::benchmark_ranking)
        .into_iter()
        .filter(|r| keyword.is_none_or(|k| r.keyword == k))
        .filter(|r| week_start.is_none_or(|week| r.week_start == week))
        .collect())
}

/// A post's weekly rank next to the benchmark clinic's, oldest week first.
pub async fn ranking_trends(store: &dyn RecordStore, post_id: &str) -> Result<Vec<RankingTrendPoint>, StoreError> {
    let rows = store
        .list(
            tables::BLOG_RANKING_TRENDS,
            &ListQuery::all()
                .where_eq("Post ID", post_id)
                .sort("Week Start", SortDirection::Asc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::ranking_trend_point))
}
