use crate::errors::{AppError, BatchError, StoreError};
use crate::models::{
    ActiveCampaignResponse, BenchmarkSettings, BlogKpiResponse, CafeKpiResponse, CafePost,
    CafeStatPoint, ChartPoint, ConversionKpiResponse, CampaignStatusResponse, DataRequestInput,
    FunnelDay, HospitalSettings, ImageType, MedicontentPost, MessageResponse, NewCommunication,
    PeriodType, PlaceReport, PostCommunication, PostUpdateRequest, RankingTrendPoint,
    SavedResponse, Subject, UploadResponse, WindowKpiResponse,
};
use crate::state::AppState;
use crate::store::AttachmentUpload;
use crate::{blog, cafe, medicontent, place, settings};

/// Posts returned by the cafe post listing.
const CAFE_POST_PAGE: usize = 100;
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    Json,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    fn range(&self) -> Option<(String, String)> {
        date_range(&self.start_date, &self.end_date)
    }
}

/// Both ends are needed for a range; a lone bound is ignored.
fn date_range(start: &Option<String>, end: &Option<String>) -> Option<(String, String)> {
    match (start, end) {
        (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
            Some((start.clone(), end.clone()))
        }
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentQuery {
    pub period_type: Option<String>,
    pub subject: Option<String>,
}

impl SegmentQuery {
    fn period(&self) -> PeriodType {
        PeriodType::from_label(self.period_type.as_deref().unwrap_or_default())
    }

    fn subject(&self) -> Subject {
        Subject::from_label(self.subject.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsQuery {
    pub status: Option<String>,
    pub subject: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    pub post_id: Option<String>,
    pub keyword: Option<String>,
    pub week_start: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceReportQuery {
    pub fetch_all: Option<bool>,
    pub page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationsQuery {
    pub post_id: Option<String>,
}

/// Empty query values count as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn store_failure(err: StoreError, message: &str) -> AppError {
    error!("{message}: {err}");
    AppError::from_store(&err, message)
}

fn batch_failure(err: BatchError, message: &str) -> AppError {
    error!("{message}: {err}");
    AppError::from_store(&err.source, message)
}

/// Unwraps a JSON body, turning axum's plain-text rejection into our JSON error.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        warn!("rejected request body: {rejection}");
        AppError::bad_request("요청 본문이 올바르지 않습니다.")
    })
}

pub async fn blog_kpi(
    State(state): State<AppState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<BlogKpiResponse>, AppError> {
    blog::blog_kpi(state.store.as_ref(), query.range())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "블로그 KPI 조회 중 오류가 발생했습니다."))
}

pub async fn blog_chart_data(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<Vec<ChartPoint>>, AppError> {
    blog::chart_data(state.store.as_ref(), query.period(), query.subject())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "차트 데이터 조회 중 오류가 발생했습니다."))
}

pub async fn active_campaign(
    State(state): State<AppState>,
) -> Result<Json<Option<ActiveCampaignResponse>>, AppError> {
    blog::active_campaign_at(state.store.as_ref(), today())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "캠페인 조회 중 오류가 발생했습니다."))
}

pub async fn campaign_status(
    State(state): State<AppState>,
) -> Result<Json<CampaignStatusResponse>, AppError> {
    blog::campaign_status(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "캠페인 상태 조회 중 오류가 발생했습니다."))
}

pub async fn campaigns(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let campaigns = blog::campaigns(state.store.as_ref())
        .await
        .map_err(|err| store_failure(err, "캠페인 목록 조회 중 오류가 발생했습니다."))?;
    Ok(Json(json!({ "campaigns": campaigns })))
}

pub async fn blog_posts(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = blog::PostFilter {
        status: query.status.clone().filter(|s| !s.is_empty()),
        subject: query.subject.as_deref().map(Subject::from_label),
        date_range: date_range(&query.start_date, &query.end_date),
    };
    let posts = blog::blog_posts(state.store.as_ref(), &filter)
        .await
        .map_err(|err| store_failure(err, "블로그 포스트 조회 중 오류가 발생했습니다."))?;
    Ok(Json(json!({ "posts": posts })))
}

pub async fn blog_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Value>, AppError> {
    let metrics = blog::weekly_metric_rows(
        state.store.as_ref(),
        present(&query.post_id),
        present(&query.week_start),
    )
    .await
    .map_err(|err| store_failure(err, "블로그 메트릭스 조회 중 오류가 발생했습니다."))?;
    Ok(Json(json!({ "metrics": metrics })))
}

pub async fn blog_benchmark(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Value>, AppError> {
    let rankings = blog::benchmark_rankings(
        state.store.as_ref(),
        present(&query.keyword),
        present(&query.week_start),
    )
    .await
    .map_err(|err| store_failure(err, "블로그 벤치마크 조회 중 오류가 발생했습니다."))?;
    Ok(Json(json!({ "rankings": rankings })))
}

pub async fn ranking_trends(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<RankingTrendPoint>>, AppError> {
    let post_id = post_id.trim();
    if post_id.is_empty() {
        return Err(AppError::bad_request("Post ID가 필요합니다."));
    }
    blog::ranking_trends(state.store.as_ref(), post_id)
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "순위 추이 데이터 조회 중 오류가 발생했습니다."))
}

pub async fn search_inflow(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<WindowKpiResponse>, AppError> {
    blog::search_inflow_at(state.store.as_ref(), query.subject(), today())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "검색 유입 조회 중 오류가 발생했습니다."))
}

pub async fn place_conversion(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<ConversionKpiResponse>, AppError> {
    blog::place_conversion_at(state.store.as_ref(), query.subject(), today())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "플레이스 전환 조회 중 오류가 발생했습니다."))
}

pub async fn cafe_kpi(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<CafeKpiResponse>, AppError> {
    cafe::cafe_kpi(state.store.as_ref(), query.subject())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "카페 KPI 조회 중 오류가 발생했습니다."))
}

pub async fn cafe_stats(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<Vec<CafeStatPoint>>, AppError> {
    cafe::cafe_stats(state.store.as_ref(), query.period(), query.subject())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "카페 통계 조회 중 오류가 발생했습니다."))
}

pub async fn cafe_posts(State(state): State<AppState>) -> Result<Json<Vec<CafePost>>, AppError> {
    cafe::latest_posts(state.store.as_ref(), CAFE_POST_PAGE)
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "카페 포스트 조회 중 오류가 발생했습니다."))
}

pub async fn place_report(
    State(state): State<AppState>,
    Query(query): Query<PlaceReportQuery>,
) -> Result<Json<PlaceReport>, AppError> {
    let page = query.page.unwrap_or(1);
    place::place_report(state.store.as_ref(), page, query.fetch_all.unwrap_or(false))
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "플레이스 리포트 조회 중 오류가 발생했습니다."))
}

pub async fn funnel_daily(
    State(state): State<AppState>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<Vec<FunnelDay>>, AppError> {
    place::funnel_daily(state.store.as_ref(), query.subject())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "퍼널 데이터 조회 중 오류가 발생했습니다."))
}

pub async fn get_benchmark(State(state): State<AppState>) -> Result<Json<BenchmarkSettings>, AppError> {
    let benchmark_hospitals = settings::benchmark_hospitals(state.store.as_ref())
        .await
        .map_err(|err| store_failure(err, "벤치마크 설정 조회 중 오류가 발생했습니다."))?;
    Ok(Json(BenchmarkSettings { benchmark_hospitals }))
}

pub async fn save_benchmark(
    State(state): State<AppState>,
    payload: Result<Json<BenchmarkSettings>, JsonRejection>,
) -> Result<Json<SavedResponse>, AppError> {
    let payload = json_body(payload)?;
    let count = settings::save_benchmark_hospitals(state.store.as_ref(), &payload.benchmark_hospitals)
        .await
        .map_err(|err| batch_failure(err, "벤치마크 설정 저장 중 오류가 발생했습니다."))?;
    Ok(Json(SavedResponse {
        ok: true,
        count: Some(count),
    }))
}

pub async fn get_hospital(
    State(state): State<AppState>,
) -> Result<Json<Option<HospitalSettings>>, AppError> {
    settings::hospital_settings(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|err| store_failure(err, "병원 설정 조회 중 오류가 발생했습니다."))
}

pub async fn save_hospital(
    State(state): State<AppState>,
    payload: Result<Json<HospitalSettings>, JsonRejection>,
) -> Result<Json<SavedResponse>, AppError> {
    let payload = json_body(payload)?;
    settings::save_hospital_settings(state.store.as_ref(), &payload)
        .await
        .map_err(|err| store_failure(err, "병원 설정 저장 중 오류가 발생했습니다."))?;
    Ok(Json(SavedResponse { ok: true, count: None }))
}

pub async fn medicontent_posts(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let posts = medicontent::posts(state.store.as_ref())
        .await
        .map_err(|err| store_failure(err, "포스트 목록 조회에 실패했습니다."))?;
    Ok(Json(json!({ "posts": posts })))
}

pub async fn medicontent_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MedicontentPost>, AppError> {
    medicontent::post(state.store.as_ref(), &id)
        .await
        .map_err(|err| store_failure(err, "포스트 조회에 실패했습니다."))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("포스트를 찾을 수 없습니다."))
}

pub async fn update_medicontent_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PostUpdateRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let payload = json_body(payload)?;
    if let Some(status) = payload.status.as_deref().filter(|s| !s.trim().is_empty()) {
        medicontent::update_status(state.store.as_ref(), &id, status.trim())
            .await
            .map_err(|err| store_failure(err, "포스트 업데이트에 실패했습니다."))?;
    }
    Ok(Json(MessageResponse {
        message: "포스트가 업데이트되었습니다.".to_string(),
    }))
}

pub async fn communications(
    State(state): State<AppState>,
    Query(query): Query<CommunicationsQuery>,
) -> Result<Json<Vec<PostCommunication>>, AppError> {
    let store = state.store.as_ref();
    let result = match present(&query.post_id) {
        Some(post_id) => medicontent::communications(store, post_id).await,
        None => medicontent::recent_activity(store).await,
    };
    result
        .map(Json)
        .map_err(|err| store_failure(err, "커뮤니케이션 조회에 실패했습니다."))
}

pub async fn add_communication(
    State(state): State<AppState>,
    payload: Result<Json<NewCommunication>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = json_body(payload)?;
    if message.post_id.trim().is_empty() {
        return Err(AppError::bad_request("Post ID가 필요합니다."));
    }
    medicontent::add_communication(state.store.as_ref(), &message)
        .await
        .map_err(|err| store_failure(err, "메시지 전송에 실패했습니다."))?;
    Ok(Json(MessageResponse {
        message: "메시지가 전송되었습니다.".to_string(),
    }))
}

pub async fn submit_data_request(
    State(state): State<AppState>,
    payload: Result<Json<DataRequestInput>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let input = json_body(payload)?;
    let id = medicontent::submit_data_request(state.store.as_ref(), &input)
        .await
        .map_err(|err| store_failure(err, "자료 요청 제출에 실패했습니다."))?;
    Ok(Json(json!({ "message": "자료 요청이 제출되었습니다.", "id": id })))
}

pub async fn update_data_request(
    State(state): State<AppState>,
    payload: Result<Json<DataRequestInput>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let input = json_body(payload)?;
    let Some(id) = present(&input.id).map(str::to_string) else {
        return Err(AppError::bad_request("자료 요청 ID가 필요합니다."));
    };
    medicontent::update_data_request(state.store.as_ref(), &id, &input)
        .await
        .map_err(|err| store_failure(err, "자료 요청 업데이트에 실패했습니다."))?;
    Ok(Json(MessageResponse {
        message: "자료 요청이 업데이트되었습니다.".to_string(),
    }))
}

pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files = Vec::new();
    let mut post_id = None;
    let mut image_type = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("잘못된 업로드 요청입니다: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("파일을 읽을 수 없습니다: {err}")))?;
                files.push(AttachmentUpload {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "postId" | "imageType" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("잘못된 업로드 요청입니다: {err}")))?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                if name == "postId" {
                    post_id = value;
                } else {
                    image_type = value;
                }
            }
            _ => {}
        }
    }

    let (post_id, image_type) = upload_target(&files, post_id, image_type)?;
    let attachments = medicontent::upload_images(state.store.as_ref(), &post_id, image_type, files)
        .await
        .map_err(|err| store_failure(err, "이미지 업로드에 실패했습니다."))?;
    Ok(Json(UploadResponse {
        message: "이미지 업로드 완료".to_string(),
        attachments,
    }))
}

/// Checks the non-file form fields of an upload, in the order the client is told about them.
fn upload_target(
    files: &[AttachmentUpload],
    post_id: Option<String>,
    image_type: Option<String>,
) -> Result<(String, ImageType), AppError> {
    if files.is_empty() {
        return Err(AppError::bad_request("파일이 없습니다."));
    }
    let (Some(post_id), Some(image_type)) = (post_id, image_type) else {
        return Err(AppError::bad_request("Post ID와 이미지 타입이 필요합니다."));
    };
    let image_type = ImageType::parse(&image_type)
        .ok_or_else(|| AppError::bad_request("이미지 타입은 before, process, after 중 하나여야 합니다."))?;
    Ok((post_id, image_type))
}

fn today() -> chrono::NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_range_bound_is_ignored() {
        let half = DateRangeQuery {
            start_date: Some("2025-08-01".to_string()),
            end_date: None,
        };
        assert_eq!(half.range(), None);

        let full = DateRangeQuery {
            start_date: Some("2025-08-01".to_string()),
            end_date: Some("2025-08-31".to_string()),
        };
        assert_eq!(
            full.range(),
            Some(("2025-08-01".to_string(), "2025-08-31".to_string()))
        );
    }

    #[test]
    fn blank_query_values_are_absent() {
        assert_eq!(present(&None), None);
        assert_eq!(present(&Some("  ".to_string())), None);
        assert_eq!(present(&Some(" P-1 ".to_string())), Some("P-1"));
    }

    #[test]
    fn missing_segment_params_use_defaults() {
        let query = SegmentQuery::default();
        assert_eq!(query.period(), PeriodType::Weekly);
        assert_eq!(query.subject(), Subject::All);

        let query = SegmentQuery {
            period_type: Some("월간".to_string()),
            subject: Some("치아미백".to_string()),
        };
        assert_eq!(query.period(), PeriodType::Monthly);
        assert_eq!(query.subject(), Subject::All);
    }

    fn photo() -> AttachmentUpload {
        AttachmentUpload {
            filename: "before.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xFF, 0xD8],
        }
    }

    #[test]
    fn upload_fields_are_checked_in_order() {
        let err = upload_target(&[], None, None).unwrap_err();
        assert_eq!(err.message, "파일이 없습니다.");

        let err = upload_target(&[photo()], None, Some("before".to_string())).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Post ID와 이미지 타입이 필요합니다.");

        let err = upload_target(&[photo()], Some("P-1".to_string()), Some("sideways".to_string()))
            .unwrap_err();
        assert_eq!(err.message, "이미지 타입은 before, process, after 중 하나여야 합니다.");

        let (post_id, image_type) =
            upload_target(&[photo()], Some("P-1".to_string()), Some("after".to_string())).unwrap();
        assert_eq!(post_id, "P-1");
        assert_eq!(image_type, ImageType::After);
    }
}
