use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

/// Room for a handful of 5 MB photos in one upload request.
pub const UPLOAD_BODY_LIMIT: usize = 50 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/blog/kpi", get(handlers::blog_kpi))
        .route("/api/blog/chart-data", get(handlers::blog_chart_data))
        .route("/api/blog/campaign/active", get(handlers::active_campaign))
        .route("/api/blog/campaign/status", get(handlers::campaign_status))
        .route("/api/blog/campaigns", get(handlers::campaigns))
        .route("/api/blog/posts", get(handlers::blog_posts))
        .route("/api/blog/search-inflow", get(handlers::search_inflow))
        .route("/api/blog/place-conversion", get(handlers::place_conversion))
        .route("/api/blog/metrics", get(handlers::blog_metrics))
        .route("/api/blog/benchmark", get(handlers::blog_benchmark))
        .route("/api/blog/ranking-trends/:post_id", get(handlers::ranking_trends))
        .route("/api/cafe/kpi", get(handlers::cafe_kpi))
        .route("/api/cafe/stats", get(handlers::cafe_stats))
        .route("/api/cafe/posts", get(handlers::cafe_posts))
        .route("/api/place/report", get(handlers::place_report))
        .route("/api/place/funnel", get(handlers::funnel_daily))
        .route(
            "/api/settings/benchmark",
            get(handlers::get_benchmark).post(handlers::save_benchmark),
        )
        .route(
            "/api/settings/hospital",
            get(handlers::get_hospital).post(handlers::save_hospital),
        )
        .route("/api/medicontent/posts", get(handlers::medicontent_posts))
        .route(
            "/api/medicontent/posts/:id",
            get(handlers::medicontent_post).patch(handlers::update_medicontent_post),
        )
        .route(
            "/api/medicontent/communications",
            get(handlers::communications).post(handlers::add_communication),
        )
        .route(
            "/api/medicontent/data-requests",
            post(handlers::submit_data_request).put(handlers::update_data_request),
        )
        .route(
            "/api/medicontent/upload-images",
            post(handlers::upload_images).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .with_state(state)
}
