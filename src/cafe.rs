//! Cafe channel: share of voice and view counts for posts mentioning the clinic.

use crate::errors::StoreError;
use crate::format::{format_delta, format_number, format_percent};
use crate::models::{
    Bucket, CafeKpiResponse, CafePost, CafeStatPoint, DatedRecord, FormattedKpi, PeriodType, Subject,
};
use crate::schema::{self, MENTIONED_TAG, POST_KEY_TAG, TREATMENTS_TAG, VIEWS, tables};
use crate::settings::hospital_name;
use crate::stats::{
    Granularity, GroupSpec, filter_records, group_records, percent_change, round_half_up,
    tag_contains,
};
use crate::store::{Fields, ListQuery, RecordStore, SortDirection};
use std::collections::{BTreeMap, BTreeSet};

const CAFE_POST_LIMIT: usize = 10_000;
const WEEKLY_VIEW_LIMIT: usize = 50_000;

fn no_data() -> CafeKpiResponse {
    let zero = |value: &str| FormattedKpi {
        value: value.to_string(),
        delta: "0%".to_string(),
    };
    CafeKpiResponse {
        share: zero("0%"),
        views: zero("0"),
    }
}

fn treats(subject: Subject) -> impl Fn(&DatedRecord) -> bool {
    move |record| subject == Subject::All || tag_contains(TREATMENTS_TAG, subject.label())(record)
}

fn monthly_views(records: &[DatedRecord]) -> BTreeMap<String, f64> {
    let spec = GroupSpec::new(Granularity::Month).sum(&[VIEWS]);
    group_records(records, &spec)
        .into_iter()
        .map(|bucket: Bucket| (bucket.key.clone(), bucket.sum(VIEWS)))
        .collect()
}

/// Share and view cards for the latest month against the one before it.
///
/// The share denominator is every post of the month, whatever its subject.
pub fn cafe_kpis(posts: &[CafePost], hospital: &str, subject: Subject) -> CafeKpiResponse {
    if posts.is_empty() {
        return no_data();
    }
    let records: Vec<DatedRecord> = posts.iter().map(schema::cafe_post_record).collect();
    let totals = monthly_views(&records);

    let ours = filter_records(records, treats(subject));
    let ours = if hospital.is_empty() {
        Vec::new()
    } else {
        filter_records(ours, tag_contains(MENTIONED_TAG, hospital))
    };
    let mentioned = monthly_views(&ours);

    let mut months = totals.keys().rev();
    let last = months.next();
    let previous = months.next();
    let views_in = |month: Option<&String>| month.and_then(|m| mentioned.get(m)).copied().unwrap_or(0.0);
    let share_in = |month: Option<&String>| {
        let total = month.and_then(|m| totals.get(m)).copied().unwrap_or(0.0);
        if total > 0.0 {
            round_half_up(100.0 * views_in(month) / total) as i64
        } else {
            0
        }
    };

    let views_now = views_in(last);
    let views_delta = percent_change(views_now, views_in(previous));
    let share_now = share_in(last);
    let share_delta = share_now - share_in(previous);

    CafeKpiResponse {
        share: FormattedKpi {
            value: format_percent(share_now as f64),
            delta: format_delta(share_delta as f64),
        },
        views: FormattedKpi {
            value: format_number(views_now),
            delta: format_delta(views_delta as f64),
        },
    }
}

pub async fn cafe_posts(store: &dyn RecordStore) -> Result<Vec<CafePost>, StoreError> {
    latest_posts(store, CAFE_POST_LIMIT).await
}

/// Newest `limit` cafe posts.
pub async fn latest_posts(store: &dyn RecordStore, limit: usize) -> Result<Vec<CafePost>, StoreError> {
    let rows = store
        .list(
            tables::CAFE_POSTS,
            &ListQuery::all().max(limit).sort("Date", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::cafe_post))
}

pub async fn cafe_kpi(store: &dyn RecordStore, subject: Subject) -> Result<CafeKpiResponse, StoreError> {
    let (posts, hospital) = tokio::try_join!(cafe_posts(store), hospital_name(store))?;
    Ok(cafe_kpis(&posts, hospital.as_deref().unwrap_or_default(), subject))
}

/// Precomputed weekly or monthly rows for the configured clinic.
pub async fn cafe_stats(
    store: &dyn RecordStore,
    period: PeriodType,
    subject: Subject,
) -> Result<Vec<CafeStatPoint>, StoreError> {
    let Some(hospital) = hospital_name(store).await? else {
        return Ok(Vec::new());
    };
    let (table, key_field) = match period {
        PeriodType::Weekly => (tables::CAFE_WEEKLY_STATS, "Week Start"),
        PeriodType::Monthly => (tables::CAFE_MONTHLY_STATS, "Month"),
    };
    let query = ListQuery::all()
        .where_eq("Hospital Name", &hospital)
        .where_eq("Subject", subject.label())
        .sort(key_field, SortDirection::Asc);

    let rows = store.list(table, &query).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let key = schema::normalize_date(row.fields.get(key_field)?)?;
            Some(CafeStatPoint {
                key,
                total_views: row.num_any(&["Total Views"]).unwrap_or(0.0),
                post_count: row.num_any(&["Post Count"]).unwrap_or(0.0).max(0.0) as usize,
            })
        })
        .collect())
}

/// Weekly and monthly stat rows per subject for posts mentioning `hospital`.
pub fn cafe_stat_rows(
    hospital: &str,
    posts: &[CafePost],
    weekly_views: &[DatedRecord],
    created_at: &str,
) -> (Vec<Fields>, Vec<Fields>) {
    let mentioned: Vec<&CafePost> = posts
        .iter()
        .filter(|post| !post.post_key.is_empty() && post.mentioned_clinics.contains(hospital))
        .collect();

    let mut weekly = Vec::new();
    let mut monthly = Vec::new();
    for subject in Subject::ALL {
        let keys: BTreeSet<&str> = mentioned
            .iter()
            .filter(|post| subject == Subject::All || post.related_treatments.contains(subject.label()))
            .map(|post| post.post_key.as_str())
            .collect();
        let views: Vec<DatedRecord> = weekly_views
            .iter()
            .filter(|record| {
                record
                    .tags
                    .get(POST_KEY_TAG)
                    .is_some_and(|key| keys.contains(key.as_str()))
            })
            .cloned()
            .collect();

        for (granularity, field, rows) in [
            (Granularity::Week, "Week Start", &mut weekly),
            (Granularity::Month, "Month", &mut monthly),
        ] {
            let spec = GroupSpec::new(granularity).sum(&[VIEWS]).distinct_by(POST_KEY_TAG);
            rows.extend(group_records(&views, &spec).into_iter().map(|bucket| {
                schema::cafe_stats_fields(
                    hospital,
                    field,
                    &bucket.key,
                    subject,
                    bucket.sum(VIEWS),
                    bucket.distinct,
                    created_at,
                )
            }));
        }
    }
    (weekly, monthly)
}

pub async fn weekly_views(store: &dyn RecordStore) -> Result<Vec<DatedRecord>, StoreError> {
    let rows = store
        .list(tables::CAFE_WEEKLY_VIEWS, &ListQuery::all().max(WEEKLY_VIEW_LIMIT))
        .await?;
    Ok(schema::parse_rows(&rows, schema::cafe_weekly_view_record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(key: &str, date: &str, views: f64, clinics: &str, treatments: &str) -> CafePost {
        CafePost {
            id: format!("rec{key}"),
            post_key: key.to_string(),
            club_id: String::new(),
            article_id: String::new(),
            cafe_name: "맘카페".to_string(),
            title: key.to_string(),
            author: String::new(),
            date: date.to_string(),
            views,
            comments_count: 0.0,
            mentioned_clinics: clinics.to_string(),
            related_treatments: treatments.to_string(),
            sentiment: String::new(),
            link: String::new(),
        }
    }

    #[test]
    fn empty_posts_give_placeholder_cards() {
        let kpi = cafe_kpis(&[], "서울치과", Subject::All);
        assert_eq!(kpi.share.value, "0%");
        assert_eq!(kpi.share.delta, "0%");
        assert_eq!(kpi.views.value, "0");
        assert_eq!(kpi.views.delta, "0%");
    }

    #[test]
    fn share_and_views_compare_last_two_months() {
        let posts = vec![
            post("a", "2025-07-03", 100.0, "서울치과", "임플란트"),
            post("b", "2025-07-10", 300.0, "다른치과", "임플란트"),
            post("c", "2025-08-02", 150.0, "서울치과, 다른치과", "임플란트"),
            post("d", "2025-08-09", 50.0, "다른치과", "신경치료"),
            post("e", "2025-08-20", 1000.0, "서울치과", "신경치료"),
        ];

        let implant = cafe_kpis(&posts, "서울치과", Subject::Implant);
        assert_eq!(implant.views.value, "150");
        assert_eq!(implant.views.delta, "+50%");
        // 150 of 1200 this month against 100 of 400 last month.
        assert_eq!(implant.share.value, "13%");
        assert_eq!(implant.share.delta, "-12%");

        let all = cafe_kpis(&posts, "서울치과", Subject::All);
        assert_eq!(all.views.value, "1,150");
        assert_eq!(all.share.value, "96%");
        assert_eq!(all.share.delta, "+71%");
    }

    #[test]
    fn stat_rows_count_distinct_posts_per_subject() {
        let posts = vec![
            post("a", "2025-08-01", 0.0, "서울치과", "임플란트"),
            post("b", "2025-08-01", 0.0, "서울치과", "신경치료"),
            post("c", "2025-08-01", 0.0, "다른치과", "임플란트"),
        ];
        let view = |week: &str, key: &str, views: f64| {
            DatedRecord::new(week).tag(POST_KEY_TAG, key).metric(VIEWS, views)
        };
        let views = vec![
            view("2025-08-04", "a", 10.0),
            view("2025-08-04", "b", 5.0),
            view("2025-08-11", "a", 7.0),
            view("2025-08-11", "c", 99.0),
        ];

        let (weekly, monthly) = cafe_stat_rows("서울치과", &posts, &views, "2025-08-15T00:00:00Z");
        // 전체: 2 weeks, 임플란트: 2 weeks, 신경치료: 1 week
        assert_eq!(weekly.len(), 5);
        assert_eq!(monthly.len(), 3);

        let all_month = &monthly[0];
        assert_eq!(all_month["Stats Key"], "서울치과-2025-08-전체");
        assert_eq!(all_month["Total Views"], 22.0);
        assert_eq!(all_month["Post Count"], 2);
        assert_eq!(weekly[0]["Week Start"], "2025-08-04");
    }

    #[tokio::test]
    async fn latest_posts_are_newest_first_and_capped() {
        let store = crate::storage::LocalStore::in_memory();
        let rows = ["2025-08-01", "2025-08-09", "2025-08-05"]
            .iter()
            .map(|date| {
                serde_json::json!({"Post Key": date, "Date": date, "Author": "익명"})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect();
        store.create(tables::CAFE_POSTS, rows).await.unwrap();

        let latest = latest_posts(&store, 2).await.unwrap();
        let dates: Vec<&str> = latest.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-08-09", "2025-08-05"]);
        assert_eq!(latest[0].author, "익명");
    }
}
