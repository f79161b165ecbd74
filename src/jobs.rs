//! Batch jobs that rebuild the precomputed tables.

use crate::batch::replace_all;
use crate::blog::{chart_points, weekly_metrics};
use crate::cafe::{cafe_posts, cafe_stat_rows, weekly_views};
use crate::errors::JobError;
use crate::models::{PeriodType, Subject};
use crate::schema::{self, tables};
use crate::settings::hospital_name;
use crate::store::{Fields, RecordStore};
use chrono::{SecondsFormat, Utc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CafeStatsSummary {
    pub weekly_rows: usize,
    pub monthly_rows: usize,
}

pub async fn aggregate_cafe_stats(store: &dyn RecordStore) -> Result<CafeStatsSummary, JobError> {
    let hospital = hospital_name(store).await?.ok_or(JobError::MissingHospital)?;
    info!(hospital = %hospital, "aggregating cafe stats");

    let (posts, views) = tokio::try_join!(cafe_posts(store), weekly_views(store))?;
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let (weekly, monthly) = cafe_stat_rows(&hospital, &posts, &views, &created_at);

    let weekly_rows = replace_all(store, tables::CAFE_WEEKLY_STATS, weekly).await?;
    let monthly_rows = replace_all(store, tables::CAFE_MONTHLY_STATS, monthly).await?;
    info!(weekly_rows, monthly_rows, "cafe stats rebuilt");
    Ok(CafeStatsSummary {
        weekly_rows,
        monthly_rows,
    })
}

/// Rewrites `Blog Chart Data` for every period and subject.
pub async fn refresh_chart_data(store: &dyn RecordStore) -> Result<usize, JobError> {
    let records = weekly_metrics(store).await?;
    let mut rows: Vec<Fields> = Vec::new();
    for period in [PeriodType::Weekly, PeriodType::Monthly] {
        for subject in Subject::ALL {
            rows.extend(
                chart_points(&records, period, subject)
                    .iter()
                    .map(|point| schema::chart_point_fields(point, period.label(), subject)),
            );
        }
    }
    let written = replace_all(store, tables::BLOG_CHART_DATA, rows).await?;
    info!(written, "chart data refreshed");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use crate::store::ListQuery;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn cafe_stats_need_a_hospital() {
        let store = LocalStore::in_memory();
        let err = aggregate_cafe_stats(&store).await.unwrap_err();
        assert!(matches!(err, JobError::MissingHospital));
    }

    #[tokio::test]
    async fn cafe_stats_replace_previous_rows() {
        let store = LocalStore::in_memory();
        store
            .create(tables::HOSPITAL_SETTINGS, vec![fields(json!({"Hospital Name": "서울치과"}))])
            .await
            .unwrap();
        store
            .create(
                tables::CAFE_POSTS,
                vec![fields(json!({"Post Key": "k1", "Date": "2025-08-01", "Mentioned Clinics": "서울치과", "Related Treatments": "임플란트"}))],
            )
            .await
            .unwrap();
        store
            .create(
                tables::CAFE_WEEKLY_VIEWS,
                vec![
                    fields(json!({"Post Key": "k1", "Week Start": "2025-08-04", "Views": 12})),
                    fields(json!({"Post Key": "k1", "Week Start": 45880, "Views": 8})),
                ],
            )
            .await
            .unwrap();
        store
            .create(tables::CAFE_WEEKLY_STATS, vec![fields(json!({"Stats Key": "stale"}))])
            .await
            .unwrap();

        let summary = aggregate_cafe_stats(&store).await.unwrap();
        // 전체 and 임플란트 each have two weeks in one month.
        assert_eq!(summary, CafeStatsSummary { weekly_rows: 4, monthly_rows: 2 });

        let weekly = store.list(tables::CAFE_WEEKLY_STATS, &ListQuery::all()).await.unwrap();
        assert_eq!(weekly.len(), 4);
        assert!(weekly.iter().all(|row| row.str_field("Stats Key") != Some("stale")));
    }

    #[tokio::test]
    async fn chart_refresh_writes_each_period_and_subject() {
        let store = LocalStore::in_memory();
        store
            .create(
                tables::BLOG_WEEKLY_METRICS,
                vec![
                    fields(json!({"Week Start": "2025-08-04", "Subject": "임플란트", "Weekly Views": 10, "Weekly Inflow": 4})),
                    fields(json!({"Week Start": "2025-08-11", "Subject": "신경치료", "Weekly Views": 6, "Weekly Inflow": 2})),
                ],
            )
            .await
            .unwrap();

        // weekly: 전체 2 + 임플란트 1 + 신경치료 1; monthly: 1 + 1 + 1
        assert_eq!(refresh_chart_data(&store).await.unwrap(), 7);
        let rows = store
            .list(
                tables::BLOG_CHART_DATA,
                &ListQuery::all().where_eq("Period Type", "월간").where_eq("Subject", "전체"),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str_field("Date"), Some("2025-08-01"));
        assert_eq!(rows[0].num_any(&["Views"]), Some(16.0));
    }
}
