use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One dated observation: a post's weekly metrics, a cafe view row, a funnel snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatedRecord {
    pub date: String,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

impl DatedRecord {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..Self::default()
        }
    }

    pub fn tag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.tags.insert(name.to_string(), value.into());
        self
    }

    pub fn metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn metric_value(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub category: Option<String>,
    pub sums: BTreeMap<String, f64>,
    pub count: usize,
    pub distinct: usize,
}

impl Bucket {
    pub fn sum(&self, metric: &str) -> f64 {
        self.sums.get(metric).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiResult {
    pub value: f64,
    pub delta_percent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedKpi {
    pub value: String,
    pub delta: String,
}

/// Treatment topic used to segment every metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subject {
    #[default]
    All,
    Implant,
    NerveTreatment,
}

impl Subject {
    pub const ALL: [Subject; 3] = [Subject::All, Subject::Implant, Subject::NerveTreatment];

    /// Unknown labels fall back to `All`.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "임플란트" => Subject::Implant,
            "신경치료" => Subject::NerveTreatment,
            _ => Subject::All,
        }
    }

    /// Stable identifier used inside the pipeline; labels stay at the edges.
    pub fn key(self) -> &'static str {
        match self {
            Subject::All => "all",
            Subject::Implant => "implant",
            Subject::NerveTreatment => "nerve_treatment",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Subject::All => "전체",
            Subject::Implant => "임플란트",
            Subject::NerveTreatment => "신경치료",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodType {
    #[default]
    Weekly,
    Monthly,
}

impl PeriodType {
    /// Unknown labels fall back to `Weekly`.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "월간" => PeriodType::Monthly,
            _ => PeriodType::Weekly,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PeriodType::Weekly => "주간",
            PeriodType::Monthly => "월간",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Before,
    Process,
    After,
}

impl ImageType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "before" => Some(ImageType::Before),
            "process" => Some(ImageType::Process),
            "after" => Some(ImageType::After),
            _ => None,
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            ImageType::Before => "Before Images",
            ImageType::Process => "Process Images",
            ImageType::After => "After Images",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub period_start: String,
    pub period_end: String,
    pub subject_cluster: String,
    pub target_inflow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignTarget {
    pub id: String,
    pub campaign_id: String,
    pub post_id: String,
    pub post_title: String,
    pub post_type: String,
    pub publish_date: String,
    pub keywords: Vec<String>,
    pub target_inflow: f64,
    pub achieved_inflow: f64,
    pub rank: Option<u32>,
    pub seo_score: Option<f64>,
    pub legal_status: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: String,
    pub post_id: String,
    pub post_title: String,
    pub target_keyword: String,
    pub subject: String,
    pub publish_date: String,
    pub blog_url: String,
    pub total_views: f64,
    pub total_inflow: f64,
    pub conversions: f64,
    pub current_rank: Option<u32>,
    pub best_rank: Option<u32>,
    pub status: String,
    pub seo_score: f64,
    pub legal_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CafePost {
    pub id: String,
    pub post_key: String,
    pub club_id: String,
    pub article_id: String,
    pub cafe_name: String,
    pub title: String,
    pub author: String,
    pub date: String,
    pub views: f64,
    pub comments_count: f64,
    pub mentioned_clinics: String,
    pub related_treatments: String,
    pub sentiment: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkHospitalRow {
    pub id: String,
    pub hospital_name: String,
    pub order: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HospitalSettings {
    pub hospital_name: String,
    pub business_number: String,
    pub representative_name: String,
    pub postal_code: String,
    pub address_line1: String,
    pub address_line2: String,
    pub phone: String,
    pub email: String,
    pub website: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicontentPost {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub post_type: String,
    pub status: String,
    pub publish_date: String,
    pub keywords: Vec<String>,
    pub treatment_type: String,
    pub seo_score: Option<f64>,
    pub legal_score: Option<f64>,
    pub updated_at: String,
}

/// One `Blog Weekly Metrics` row as the metrics endpoint returns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogWeeklyMetric {
    pub id: String,
    pub post_id: String,
    pub week_start: String,
    pub week_number: u32,
    pub weekly_views: f64,
    pub weekly_inflow: f64,
    pub weekly_rank: Option<u32>,
    pub weekly_place_clicks: f64,
    pub weekly_conversions: f64,
    pub weekly_conversion_rate: f64,
    pub top_keywords: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRanking {
    pub id: String,
    pub hospital_name: String,
    pub keyword: String,
    pub week_start: String,
    pub ranking: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingTrendPoint {
    pub week_start: String,
    pub my_rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_hospital: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_rank: Option<u32>,
}

// Place rows keep the column names the dashboard client already reads.

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaceRanking {
    pub keyword: String,
    pub week: String,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceDetail {
    #[serde(rename = "Week")]
    pub week: String,
    #[serde(rename = "TotalPV")]
    pub total_pv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceReview {
    pub id: String,
    #[serde(rename = "ReviewId")]
    pub review_id: String,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "ChannelId")]
    pub channel_id: String,
    #[serde(rename = "AuthorAt")]
    pub author_at: String,
    #[serde(rename = "Reply", skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(rename = "Category", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "Report Status", skip_serializing_if = "Option::is_none")]
    pub report_status: Option<String>,
    #[serde(rename = "Reply Status", skip_serializing_if = "Option::is_none")]
    pub reply_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaceReviewWord {
    pub word: String,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceReviewReport {
    pub id: String,
    pub title: String,
    pub link: String,
    pub author: String,
    pub date: String,
    pub content: String,
    pub cafe_name: String,
    pub text_analysis: String,
    pub meta_analysis: String,
    pub author_analysis: String,
    pub recommendation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceReport {
    pub rankings: Vec<PlaceRanking>,
    pub details: Vec<PlaceDetail>,
    pub reviews: Vec<PlaceReview>,
    pub total_reviews: usize,
    pub review_words: Vec<PlaceReviewWord>,
    pub review_reports: Vec<PlaceReviewReport>,
}

/// One day of the acquisition funnel. `counts` holds every funnel edge by its
/// column name plus the summary aliases (`Impressions`, `Clicks`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelDay {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(flatten)]
    pub counts: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCommunication {
    pub id: String,
    pub post_id: String,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCommunication {
    pub post_id: String,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Body of a data-request submit or edit. Absent fields are left untouched on edit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataRequestInput {
    pub id: Option<String>,
    pub post_id: Option<String>,
    pub concept_message: Option<String>,
    pub patient_condition: Option<String>,
    pub treatment_process_message: Option<String>,
    pub treatment_result_message: Option<String>,
    pub additional_message: Option<String>,
    pub before_images_text: Option<String>,
    pub process_images_text: Option<String>,
    pub after_images_text: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusKpi {
    pub active: usize,
    pub total: usize,
    pub warning_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInflowKpi {
    pub total: f64,
    pub change_rate: i64,
    pub top_keywords: Vec<String>,
    pub display: FormattedKpi,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceConversionKpi {
    pub rate: f64,
    pub change_rate: i64,
    pub top_posts: Vec<String>,
    pub display: FormattedKpi,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogKpiResponse {
    pub campaign_status: CampaignStatusKpi,
    pub search_inflow: SearchInflowKpi,
    pub place_conversion: PlaceConversionKpi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub date: String,
    pub views: f64,
    pub inflow: f64,
    pub place_clicks: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    pub id: String,
    pub name: String,
    pub period_start: String,
    pub period_end: String,
    pub subject_cluster: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignItem {
    pub date: String,
    pub post_id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub target_inflow: f64,
    pub achieved_inflow: f64,
    pub progress_percent: f64,
    pub rank: Option<u32>,
    pub seo_score: Option<f64>,
    pub legal_status: String,
    pub post_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCampaignResponse {
    pub campaign: CampaignSummary,
    pub target_inflow: f64,
    pub achieved_inflow: f64,
    pub progress_percent: f64,
    pub items: Vec<CampaignItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusResponse {
    pub normal_count: usize,
    pub total_count: usize,
    pub current_campaign_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowKpiResponse {
    pub total: f64,
    pub change_rate: i64,
    pub display: FormattedKpi,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionKpiResponse {
    pub rate: f64,
    pub change_rate: i64,
    pub display: FormattedKpi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CafeKpiResponse {
    pub share: FormattedKpi,
    pub views: FormattedKpi,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CafeStatPoint {
    pub key: String,
    pub total_views: f64,
    pub post_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSettings {
    #[serde(default, deserialize_with = "names_or_empty")]
    pub benchmark_hospitals: Vec<String>,
}

/// A non-array value reads as an empty list; non-string entries are skipped.
fn names_or_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(name) => Some(name),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PostUpdateRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub attachments: Vec<Attachment>,
}
