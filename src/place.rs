//! Place channel: map rankings, detail views, reviews and the daily funnel.

use crate::errors::StoreError;
use crate::models::{FunnelDay, PlaceReport, PlaceReview, Subject};
use crate::schema::{self, FUNNEL_SUBJECT_FIELD, tables};
use crate::stats::parse_date;
use crate::store::{ListQuery, RecordStore, SortDirection};
use tracing::debug;

pub const REVIEW_PAGE_SIZE: usize = 10;
/// Page size used when the client asks for every review at once.
pub const REVIEW_FETCH_ALL: usize = 10_000;
const REVIEW_WORD_LIMIT: usize = 50;

/// One page of `items`, pages counted from 1. Page 0 reads as page 1.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Vec<T> {
    let skip = page.max(1).saturating_sub(1).saturating_mul(page_size);
    items.into_iter().skip(skip).take(page_size).collect()
}

/// Every review, newest first, with the total before paging.
pub async fn reviews(
    store: &dyn RecordStore,
    page: usize,
    page_size: usize,
) -> Result<(Vec<PlaceReview>, usize), StoreError> {
    let rows = store
        .list(
            tables::PLACE_REVIEW,
            &ListQuery::all().sort("AuthorAt", SortDirection::Desc),
        )
        .await?;
    let all = schema::parse_rows(&rows, schema::place_review);
    let total = all.len();
    Ok((paginate(all, page, page_size), total))
}

pub async fn place_report(store: &dyn RecordStore, page: usize, fetch_all: bool) -> Result<PlaceReport, StoreError> {
    let (page, page_size) = if fetch_all {
        (1, REVIEW_FETCH_ALL)
    } else {
        (page, REVIEW_PAGE_SIZE)
    };
    let by_week = ListQuery::all().sort("Week", SortDirection::Desc);
    let words = ListQuery::all()
        .sort("Count", SortDirection::Desc)
        .max(REVIEW_WORD_LIMIT);
    let all = ListQuery::all();

    let (ranking_rows, detail_rows, (page_reviews, total), word_rows, report_rows) = tokio::try_join!(
        store.list(tables::PLACE_RANKING, &by_week),
        store.list(tables::PLACE_DETAIL, &by_week),
        reviews(store, page, page_size),
        store.list(tables::PLACE_REVIEW_WORD, &words),
        store.list(tables::PLACE_REVIEW_REPORT, &all),
    )?;

    let total_reviews = if fetch_all { page_reviews.len() } else { total };
    debug!(page, total_reviews, "place report assembled");
    Ok(PlaceReport {
        rankings: schema::parse_rows(&ranking_rows, schema::place_ranking),
        details: schema::parse_rows(&detail_rows, schema::place_detail),
        reviews: page_reviews,
        total_reviews,
        review_words: schema::parse_rows(&word_rows, schema::place_review_word),
        review_reports: schema::parse_rows(&report_rows, schema::place_review_report),
    })
}

/// Daily funnel rows for a subject, oldest day first.
pub async fn funnel_daily(store: &dyn RecordStore, subject: Subject) -> Result<Vec<FunnelDay>, StoreError> {
    let query = match subject {
        Subject::All => ListQuery::all(),
        _ => ListQuery::all().where_eq(FUNNEL_SUBJECT_FIELD, subject.label()),
    };
    let rows = store.list(tables::FUNNEL_DAILY, &query).await?;
    let mut days = schema::parse_rows(&rows, schema::funnel_day);
    days.sort_by_key(|day| parse_date(&day.date));
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use crate::store::Fields;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn seed(store: &LocalStore, table: &str, rows: Vec<Value>) {
        store
            .create(table, rows.into_iter().map(fields).collect())
            .await
            .unwrap();
    }

    #[test]
    fn pages_start_at_one() {
        let items: Vec<u32> = (1..=25).collect();
        assert_eq!(paginate(items.clone(), 1, 10), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), 3, 10), (21..=25).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), 0, 10), paginate(items.clone(), 1, 10));
        assert!(paginate(items, 4, 10).is_empty());
    }

    #[tokio::test]
    async fn report_pages_reviews_but_counts_all() {
        let store = LocalStore::in_memory();
        let reviews: Vec<Value> = (1..=12)
            .map(|day| json!({"ReviewId": format!("r{day}"), "Score": 5, "AuthorAt": format!("2025-08-{day:02}")}))
            .collect();
        seed(&store, tables::PLACE_REVIEW, reviews).await;
        seed(
            &store,
            tables::PLACE_RANKING,
            vec![
                json!({"Keyword": "강남 치과", "Week": "2025-08-04", "Rank": 4}),
                json!({"Keyword": "강남 치과", "Week": "2025-08-11", "Rank": 2}),
            ],
        )
        .await;
        seed(
            &store,
            tables::PLACE_REVIEW_WORD,
            vec![json!({"Word": "친절", "Count": 3}), json!({"Word": "", "Count": 9}), json!({"Word": "깨끗", "Count": 7})],
        )
        .await;

        let report = place_report(&store, 1, false).await.unwrap();
        assert_eq!(report.reviews.len(), REVIEW_PAGE_SIZE);
        assert_eq!(report.total_reviews, 12);
        assert_eq!(report.reviews[0].review_id, "r12");
        assert_eq!(report.rankings[0].week, "2025-08-11");
        let words: Vec<&str> = report.review_words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["깨끗", "친절"]);
        assert!(report.details.is_empty());

        let second = place_report(&store, 2, false).await.unwrap();
        assert_eq!(second.reviews.len(), 2);

        let everything = place_report(&store, 2, true).await.unwrap();
        assert_eq!(everything.reviews.len(), 12);
        assert_eq!(everything.total_reviews, 12);
    }

    #[tokio::test]
    async fn funnel_filters_by_subject_label_and_sorts_by_day() {
        let store = LocalStore::in_memory();
        seed(
            &store,
            tables::FUNNEL_DAILY,
            vec![
                json!({"Date": "2025-08-03", "진료과목": "임플란트", "bookings": 2}),
                json!({"Date": "2025-08-01", "진료과목": "임플란트", "bookings": 1}),
                json!({"Date": "2025-08-02", "진료과목": "신경치료", "bookings": 5}),
            ],
        )
        .await;

        let all = funnel_daily(&store, Subject::All).await.unwrap();
        let dates: Vec<&str> = all.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-08-01", "2025-08-02", "2025-08-03"]);

        let implant = funnel_daily(&store, Subject::Implant).await.unwrap();
        let bookings: Vec<f64> = implant.iter().map(|d| d.counts["Bookings"]).collect();
        assert_eq!(bookings, vec![1.0, 2.0]);
    }
}
