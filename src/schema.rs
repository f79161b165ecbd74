//! Parsing of raw store rows into typed records, and the reverse for writes.
//!
//! The store is edited by hand, so field names drift (`Weekly Views` vs
//! `weeklyViews`) and dates arrive either as ISO strings or as spreadsheet
//! serial numbers. Everything downstream sees only the typed forms.

use crate::errors::RecordError;
use crate::models::{
    BenchmarkHospitalRow, BenchmarkRanking, BlogPost, BlogWeeklyMetric, CafePost, Campaign,
    CampaignTarget, ChartPoint, DataRequestInput, DatedRecord, FunnelDay, HospitalSettings,
    MedicontentPost, NewCommunication, PlaceDetail, PlaceRanking, PlaceReview, PlaceReviewReport,
    PlaceReviewWord, PostCommunication, RankingTrendPoint, Subject,
};
use crate::stats::SUBJECT_TAG;
use crate::store::{Fields, RawRecord};
use chrono::{Duration, NaiveDate};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::warn;

pub mod tables {
    pub const BLOG_POSTS: &str = "Blog Posts Summary";
    pub const BLOG_WEEKLY_METRICS: &str = "Blog Weekly Metrics";
    pub const BLOG_CHART_DATA: &str = "Blog Chart Data";
    pub const BLOG_CAMPAIGNS: &str = "Blog Campaigns";
    pub const CAMPAIGN_TARGETS: &str = "Campaign Targets";
    pub const BENCHMARK_SETTINGS: &str = "Settings - Benchmark";
    pub const BENCHMARK_HOSPITALS: &str = "Benchmark Hospitals";
    pub const HOSPITAL_SETTINGS: &str = "Settings - Hospital";
    pub const CAFE_POSTS: &str = "Cafe Posts";
    pub const CAFE_WEEKLY_VIEWS: &str = "Cafe Weekly Views";
    pub const CAFE_WEEKLY_STATS: &str = "Cafe Hospital Weekly Stats";
    pub const CAFE_MONTHLY_STATS: &str = "Cafe Hospital Monthly Stats";
    pub const BLOG_WEEKLY_RANKINGS: &str = "Blog Weekly Rankings";
    pub const BLOG_RANKING_TRENDS: &str = "Blog Ranking Trends";
    pub const MEDICONTENT_POSTS: &str = "Medicontent Posts";
    pub const POST_DATA_REQUESTS: &str = "Post Data Requests";
    pub const POST_COMMUNICATIONS: &str = "Post Communications";
    pub const PLACE_RANKING: &str = "Place Ranking";
    pub const PLACE_DETAIL: &str = "Place Detail";
    pub const PLACE_REVIEW: &str = "Place Review";
    pub const PLACE_REVIEW_WORD: &str = "Place Review Word";
    pub const PLACE_REVIEW_REPORT: &str = "Place Review Report";
    pub const FUNNEL_DAILY: &str = "[Demo] Funnel Daily Data";
}

pub const VIEWS: &str = "views";
pub const INFLOW: &str = "inflow";
pub const PLACE_CLICKS: &str = "placeClicks";
pub const CONVERSIONS: &str = "conversions";
pub const CONVERSION_RATE: &str = "conversionRate";

pub const POST_ID_TAG: &str = "postId";
pub const POST_KEY_TAG: &str = "postKey";
pub const TOP_KEYWORDS_TAG: &str = "topKeywords";
pub const MENTIONED_TAG: &str = "mentionedClinics";
pub const TREATMENTS_TAG: &str = "relatedTreatments";

/// Funnel edge columns of the daily funnel table, in display order.
pub const FUNNEL_COLUMNS: [&str; 23] = [
    "general_node_search",
    "brand_node_search",
    "brand_to_blog_direct",
    "brand_to_site_direct",
    "general_to_blog_direct",
    "general_to_site_direct",
    "homepage_node_total",
    "blog_node_total",
    "placeDetailPV",
    "bookingPageVisits",
    "bookings",
    "blog_to_place_detail",
    "place_list_to_detail",
    "homepage_to_place_detail",
    "place_to_booking_page",
    "homepage_to_booking_page_direct",
    "booking_page_to_requests",
    "place_ad_node_total",
    "place_ad_to_detail",
    "general_search_to_detail",
    "brand_search_to_detail",
    "map_rank",
    "cafe_view",
];

/// Summary names older charts read, and the funnel column each one mirrors.
const FUNNEL_ALIASES: [(&str, &str); 4] = [
    ("Impressions", "general_node_search"),
    ("Clicks", "placeDetailPV"),
    ("Conversions", "bookingPageVisits"),
    ("Bookings", "bookings"),
];

/// Column holding the treatment subject label in the funnel table.
pub const FUNNEL_SUBJECT_FIELD: &str = "진료과목";

/// Serial numbers at or below this are treated as plain numbers, not dates.
const SERIAL_DATE_FLOOR: f64 = 40000.0;

/// Parses every row, logging and skipping the ones that fail.
pub fn parse_rows<T, F>(rows: &[RawRecord], parse: F) -> Vec<T>
where
    F: Fn(&RawRecord) -> Result<T, RecordError>,
{
    rows.iter()
        .filter_map(|row| match parse(row) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("skipping row: {err}");
                None
            }
        })
        .collect()
}

/// ISO date text for a cell holding either a string or a spreadsheet serial.
pub fn normalize_date(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => {
            let serial = n.as_f64()?;
            if serial <= SERIAL_DATE_FLOOR {
                return None;
            }
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            let date = epoch.checked_add_signed(Duration::days(serial.floor() as i64))?;
            Some(date.format("%Y-%m-%d").to_string())
        }
        _ => None,
    }
}

fn date_any(row: &RawRecord, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| row.fields.get(*name).and_then(normalize_date))
}

fn text(row: &RawRecord, names: &[&str]) -> String {
    row.str_any(names).unwrap_or_default().trim().to_string()
}

fn number(row: &RawRecord, names: &[&str]) -> f64 {
    row.num_any(names).unwrap_or(0.0)
}

fn optional_text(row: &RawRecord, names: &[&str]) -> Option<String> {
    Some(text(row, names)).filter(|value| !value.is_empty())
}

fn rank(row: &RawRecord, names: &[&str]) -> Option<u32> {
    row.num_any(names).filter(|r| *r > 0.0).map(|r| r as u32)
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn one_of(value: String, allowed: &[&str], fallback: &str) -> String {
    if allowed.contains(&value.as_str()) {
        value
    } else {
        fallback.to_string()
    }
}

fn missing(row: &RawRecord, field: &str) -> RecordError {
    RecordError::MissingField {
        id: row.id.clone(),
        field: field.to_string(),
    }
}

/// A `Blog Weekly Metrics` row as a dated record tagged by subject and post.
pub fn weekly_metric_record(row: &RawRecord) -> Result<DatedRecord, RecordError> {
    let date = date_any(row, &["Week Start", "weekStart"]).ok_or_else(|| missing(row, "Week Start"))?;
    let subject = Subject::from_label(&text(row, &["Subject"]));

    let mut record = DatedRecord::new(date)
        .tag(SUBJECT_TAG, subject.key())
        .tag(POST_ID_TAG, text(row, &["Post ID", "postId"]))
        .metric(VIEWS, number(row, &["Weekly Views", "weeklyViews", "Views"]))
        .metric(INFLOW, number(row, &["Weekly Inflow", "weeklyInflow", "Inflow"]))
        .metric(
            PLACE_CLICKS,
            number(row, &["Weekly Place Clicks", "weeklyPlaceClicks", "Place Clicks"]),
        )
        .metric(
            CONVERSIONS,
            number(row, &["Weekly Conversions", "weeklyConversions", "Conversions"]),
        )
        .metric(
            CONVERSION_RATE,
            number(row, &["Weekly Conversion Rate", "weeklyConversionRate"]),
        );
    let keywords = text(row, &["Top Keywords", "topKeywords"]);
    if !keywords.is_empty() {
        record = record.tag(TOP_KEYWORDS_TAG, keywords);
    }
    Ok(record)
}

/// A `Cafe Weekly Views` row; both the week and the post key are required.
pub fn cafe_weekly_view_record(row: &RawRecord) -> Result<DatedRecord, RecordError> {
    let date = date_any(row, &["Week Start"]).ok_or_else(|| missing(row, "Week Start"))?;
    let post_key = text(row, &["Post Key"]);
    if post_key.is_empty() {
        return Err(missing(row, "Post Key"));
    }
    Ok(DatedRecord::new(date)
        .tag(POST_KEY_TAG, post_key)
        .metric(VIEWS, number(row, &["Views"])))
}

pub fn cafe_post(row: &RawRecord) -> Result<CafePost, RecordError> {
    Ok(CafePost {
        id: row.id.clone(),
        post_key: text(row, &["Post Key"]),
        club_id: text(row, &["Club ID"]),
        article_id: text(row, &["Article ID"]),
        cafe_name: text(row, &["Cafe Name"]),
        title: text(row, &["Title"]),
        author: text(row, &["Author"]),
        date: date_any(row, &["Date"]).unwrap_or_default(),
        views: number(row, &["Views"]),
        comments_count: number(row, &["Comments Count"]),
        mentioned_clinics: text(row, &["Mentioned Clinics"]),
        related_treatments: text(row, &["Related Treatments"]),
        sentiment: text(row, &["Sentiment"]),
        link: text(row, &["Link"]),
    })
}

/// Cafe post as a dated record; treatments stay a free-text tag.
pub fn cafe_post_record(post: &CafePost) -> DatedRecord {
    DatedRecord::new(post.date.clone())
        .tag(POST_KEY_TAG, post.post_key.clone())
        .tag(MENTIONED_TAG, post.mentioned_clinics.clone())
        .tag(TREATMENTS_TAG, post.related_treatments.clone())
        .metric(VIEWS, post.views)
}

pub fn blog_post(row: &RawRecord) -> Result<BlogPost, RecordError> {
    Ok(BlogPost {
        id: row.id.clone(),
        post_id: text(row, &["Post ID"]),
        post_title: text(row, &["Post Title"]),
        target_keyword: text(row, &["Target Keyword"]),
        subject: text(row, &["Subject"]),
        publish_date: date_any(row, &["Publish Date"]).unwrap_or_default(),
        blog_url: text(row, &["Blog URL"]),
        total_views: number(row, &["Total Views"]),
        total_inflow: number(row, &["Total Inflow"]),
        conversions: number(row, &["Total Conversions"]),
        current_rank: rank(row, &["Current Rank"]),
        best_rank: rank(row, &["Best Rank"]),
        status: one_of(text(row, &["Status"]), &["정상", "순위하락", "미노출"], "정상"),
        seo_score: number(row, &["SEO Score"]),
        legal_status: one_of(text(row, &["Legal Status"]), &["안전", "주의", "위험"], "안전"),
    })
}

pub fn campaign(row: &RawRecord) -> Result<Campaign, RecordError> {
    let name = text(row, &["Name"]);
    if name.is_empty() {
        return Err(missing(row, "Name"));
    }
    Ok(Campaign {
        id: row.id.clone(),
        campaign_id: text(row, &["Campaign ID"]),
        name,
        period_start: date_any(row, &["Period Start"]).unwrap_or_default(),
        period_end: date_any(row, &["Period End"]).unwrap_or_default(),
        subject_cluster: text(row, &["Subject Cluster"]),
        target_inflow: number(row, &["Target Inflow"]),
    })
}

pub fn campaign_target(row: &RawRecord) -> Result<CampaignTarget, RecordError> {
    let post_type = text(row, &["Post Type"]);
    let legal_status = text(row, &["Legal Status"]);
    let status = text(row, &["Status"]);
    Ok(CampaignTarget {
        id: row.id.clone(),
        campaign_id: text(row, &["Campaign ID"]),
        post_id: text(row, &["Post ID"]),
        post_title: text(row, &["Post Title"]),
        post_type: if post_type.is_empty() { "유입".to_string() } else { post_type },
        publish_date: date_any(row, &["Publish Date"]).unwrap_or_default(),
        keywords: split_list(&text(row, &["Keywords"]), ','),
        target_inflow: number(row, &["Target Inflow"]),
        achieved_inflow: number(row, &["Achieved Inflow"]),
        rank: rank(row, &["Rank"]),
        seo_score: row.num_any(&["SEO Score"]),
        legal_status: if legal_status.is_empty() { "안전".to_string() } else { legal_status },
        status: if status.is_empty() { "normal".to_string() } else { status },
    })
}

pub fn benchmark_row(row: &RawRecord) -> Result<BenchmarkHospitalRow, RecordError> {
    let hospital_name = text(row, &["Hospital Name"]);
    if hospital_name.is_empty() {
        return Err(missing(row, "Hospital Name"));
    }
    Ok(BenchmarkHospitalRow {
        id: row.id.clone(),
        hospital_name,
        order: number(row, &["Order"]).max(0.0) as u32,
        active: row.bool_field("Active"),
    })
}

/// The comma-separated fallback stored on `Settings - Benchmark`.
pub fn benchmark_csv(row: &RawRecord) -> Vec<String> {
    split_list(&text(row, &["Benchmark Hospitals"]), ',')
}

pub fn hospital_settings(row: &RawRecord) -> Result<HospitalSettings, RecordError> {
    Ok(HospitalSettings {
        hospital_name: text(row, &["Hospital Name"]),
        business_number: text(row, &["Business Number"]),
        representative_name: text(row, &["Representative Name"]),
        postal_code: text(row, &["Postal Code"]),
        address_line1: text(row, &["Address Line1"]),
        address_line2: text(row, &["Address Line2"]),
        phone: text(row, &["Phone"]),
        email: text(row, &["Email"]),
        website: text(row, &["Website"]),
    })
}

pub fn medicontent_post(row: &RawRecord) -> Result<MedicontentPost, RecordError> {
    let title = text(row, &["Title"]);
    if title.is_empty() {
        return Err(missing(row, "Title"));
    }
    Ok(MedicontentPost {
        id: row.id.clone(),
        title,
        post_type: text(row, &["Type"]),
        status: text(row, &["Status"]),
        publish_date: date_any(row, &["Publish Date"]).unwrap_or_default(),
        keywords: split_list(&text(row, &["Keywords"]), ','),
        treatment_type: text(row, &["Treatment Type"]),
        seo_score: row.num_any(&["SEO Score"]),
        legal_score: row.num_any(&["Legal Score"]),
        updated_at: text(row, &["Updated At"]),
    })
}

/// A `Blog Weekly Metrics` row in its listing form, both column namings accepted.
pub fn blog_weekly_metric(row: &RawRecord) -> Result<BlogWeeklyMetric, RecordError> {
    let week_number = number(row, &["Week Number", "weekNumber"]);
    Ok(BlogWeeklyMetric {
        id: row.id.clone(),
        post_id: text(row, &["Post ID", "postId"]),
        week_start: date_any(row, &["Week Start", "weekStart"]).unwrap_or_default(),
        week_number: if week_number > 0.0 { week_number as u32 } else { 1 },
        weekly_views: number(row, &["Weekly Views", "weeklyViews"]),
        weekly_inflow: number(row, &["Weekly Inflow", "weeklyInflow"]),
        weekly_rank: rank(row, &["Weekly Rank", "weeklyRank"]),
        weekly_place_clicks: number(row, &["Weekly Place Clicks", "weeklyPlaceClicks"]),
        weekly_conversions: number(row, &["Weekly Conversions", "weeklyConversions"]),
        weekly_conversion_rate: number(row, &["Weekly Conversion Rate", "weeklyConversionRate"]),
        top_keywords: optional_text(row, &["Top Keywords", "topKeywords"]),
    })
}

pub fn benchmark_ranking(row: &RawRecord) -> Result<BenchmarkRanking, RecordError> {
    Ok(BenchmarkRanking {
        id: row.id.clone(),
        hospital_name: text(row, &["Hospital Name", "hospitalName"]),
        keyword: text(row, &["Keyword", "keyword"]),
        week_start: date_any(row, &["Week Start", "weekStart"]).unwrap_or_default(),
        ranking: rank(row, &["Ranking", "ranking"]).unwrap_or(0),
    })
}

pub fn ranking_trend_point(row: &RawRecord) -> Result<RankingTrendPoint, RecordError> {
    Ok(RankingTrendPoint {
        week_start: date_any(row, &["Week Start"]).unwrap_or_default(),
        my_rank: rank(row, &["My Rank"]).unwrap_or(0),
        benchmark_hospital: optional_text(row, &["Benchmark Hospital"]),
        benchmark_rank: rank(row, &["Benchmark Rank"]),
    })
}

pub fn place_ranking(row: &RawRecord) -> Result<PlaceRanking, RecordError> {
    Ok(PlaceRanking {
        keyword: text(row, &["Keyword"]),
        week: date_any(row, &["Week"]).unwrap_or_default(),
        rank: rank(row, &["Rank"]).unwrap_or(0),
    })
}

pub fn place_detail(row: &RawRecord) -> Result<PlaceDetail, RecordError> {
    Ok(PlaceDetail {
        week: date_any(row, &["Week"]).unwrap_or_default(),
        total_pv: number(row, &["TotalPV"]),
    })
}

pub fn place_review(row: &RawRecord) -> Result<PlaceReview, RecordError> {
    Ok(PlaceReview {
        id: row.id.clone(),
        review_id: text(row, &["ReviewId"]),
        score: number(row, &["Score"]),
        content: text(row, &["Content"]),
        channel_id: text(row, &["ChannelId"]),
        author_at: date_any(row, &["AuthorAt"]).unwrap_or_default(),
        reply: optional_text(row, &["Reply"]),
        category: optional_text(row, &["Category"]),
        report_status: optional_text(row, &["Report Status"]),
        reply_status: optional_text(row, &["Reply Status"]),
    })
}

pub fn place_review_word(row: &RawRecord) -> Result<PlaceReviewWord, RecordError> {
    let word = text(row, &["Word"]);
    if word.is_empty() {
        return Err(missing(row, "Word"));
    }
    Ok(PlaceReviewWord {
        word,
        count: number(row, &["Count"]),
    })
}

pub fn place_review_report(row: &RawRecord) -> Result<PlaceReviewReport, RecordError> {
    Ok(PlaceReviewReport {
        id: row.id.clone(),
        title: text(row, &["Title"]),
        link: text(row, &["Link"]),
        author: text(row, &["Author"]),
        date: date_any(row, &["Date"]).unwrap_or_default(),
        content: text(row, &["content", "Content"]),
        cafe_name: text(row, &["Channel ID"]),
        text_analysis: text(row, &["Text Analysis"]),
        meta_analysis: text(row, &["Meta Analysis"]),
        author_analysis: text(row, &["Author Analysis"]),
        recommendation: text(row, &["Recommendation"]),
    })
}

/// A daily funnel row. Missing edges count as zero; `Revenue` is always zero.
pub fn funnel_day(row: &RawRecord) -> Result<FunnelDay, RecordError> {
    let date = date_any(row, &["Date"]).ok_or_else(|| missing(row, "Date"))?;
    let mut counts: BTreeMap<String, f64> = FUNNEL_COLUMNS
        .iter()
        .map(|column| (column.to_string(), number(row, &[*column])))
        .collect();
    for (alias, column) in FUNNEL_ALIASES {
        let value = counts.get(column).copied().unwrap_or(0.0);
        counts.insert(alias.to_string(), value);
    }
    counts.insert("Revenue".to_string(), 0.0);
    Ok(FunnelDay {
        date,
        subject: text(row, &[FUNNEL_SUBJECT_FIELD]),
        counts,
    })
}

pub fn post_communication(row: &RawRecord) -> Result<PostCommunication, RecordError> {
    Ok(PostCommunication {
        id: row.id.clone(),
        post_id: text(row, &["Post ID"]),
        sender: text(row, &["Sender"]),
        sender_name: text(row, &["Sender Name"]),
        content: text(row, &["Content"]),
        timestamp: text(row, &["Timestamp"]),
        kind: text(row, &["Type"]),
    })
}

fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

pub fn chart_point_fields(point: &ChartPoint, period: &str, subject: Subject) -> Fields {
    into_fields(json!({
        "Date": point.date,
        "Period Type": period,
        "Subject": subject.label(),
        "Views": point.views,
        "Inflow": point.inflow,
        "Place Clicks": point.place_clicks,
        "Conversion Rate": point.conversion_rate,
    }))
}

pub fn cafe_stats_fields(
    hospital_name: &str,
    period_field: &str,
    key: &str,
    subject: Subject,
    total_views: f64,
    post_count: usize,
    created_at: &str,
) -> Fields {
    let mut fields = into_fields(json!({
        "Stats Key": format!("{hospital_name}-{key}-{}", subject.label()),
        "Hospital Name": hospital_name,
        "Subject": subject.label(),
        "Total Views": total_views,
        "Post Count": post_count,
        "Created At": created_at,
    }));
    fields.insert(period_field.to_string(), Value::String(key.to_string()));
    fields
}

pub fn benchmark_row_fields(name: &str, order: usize, now: &str) -> Fields {
    into_fields(json!({
        "Hospital Name": name,
        "Order": order,
        "Active": true,
        "Created At": now,
        "Updated At": now,
    }))
}

pub fn hospital_settings_fields(settings: &HospitalSettings) -> Fields {
    into_fields(json!({
        "Hospital Name": settings.hospital_name,
        "Business Number": settings.business_number,
        "Representative Name": settings.representative_name,
        "Postal Code": settings.postal_code,
        "Address Line1": settings.address_line1,
        "Address Line2": settings.address_line2,
        "Phone": settings.phone,
        "Email": settings.email,
        "Website": settings.website,
    }))
}

pub fn communication_fields(message: &NewCommunication, now: &str) -> Fields {
    into_fields(json!({
        "Post ID": message.post_id,
        "Sender": message.sender,
        "Sender Name": message.sender_name,
        "Content": message.content,
        "Timestamp": now,
        "Type": message.kind,
    }))
}

/// Only the fields present in `input`, so an edit never blanks a column.
pub fn data_request_fields(input: &DataRequestInput) -> Fields {
    let columns = [
        ("Concept Message", &input.concept_message),
        ("Patient Condition", &input.patient_condition),
        ("Treatment Process Message", &input.treatment_process_message),
        ("Treatment Result Message", &input.treatment_result_message),
        ("Additional Message", &input.additional_message),
        ("Before Images Texts", &input.before_images_text),
        ("Process Images Texts", &input.process_images_text),
        ("After Images Texts", &input.after_images_text),
        ("Status", &input.status),
    ];
    columns
        .into_iter()
        .filter_map(|(column, value)| {
            value
                .as_ref()
                .map(|value| (column.to_string(), Value::String(value.clone())))
        })
        .collect()
}
