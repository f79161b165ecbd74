use crate::batch::replace_all;
use crate::errors::{BatchError, StoreError};
use crate::models::HospitalSettings;
use crate::schema::{self, tables};
use crate::store::{Fields, ListQuery, RecordStore, SortDirection};
use chrono::Local;
use serde_json::Value;

/// Benchmark hospital names in display order.
///
/// The row table wins; the comma-separated settings field is only read when
/// no rows exist yet.
pub async fn benchmark_hospitals(store: &dyn RecordStore) -> Result<Vec<String>, StoreError> {
    let rows = store
        .list(
            tables::BENCHMARK_HOSPITALS,
            &ListQuery::all().sort("Order", SortDirection::Asc),
        )
        .await?;
    let mut parsed = schema::parse_rows(&rows, schema::benchmark_row);
    if !parsed.is_empty() {
        parsed.sort_by_key(|row| row.order);
        return Ok(parsed.into_iter().map(|row| row.hospital_name).collect());
    }

    let settings = store
        .list(tables::BENCHMARK_SETTINGS, &ListQuery::all().max(1))
        .await?;
    Ok(settings.first().map(schema::benchmark_csv).unwrap_or_default())
}

/// Replaces the benchmark list and mirrors it into the settings field.
pub async fn save_benchmark_hospitals(
    store: &dyn RecordStore,
    names: &[String],
) -> Result<usize, BatchError> {
    let cleaned: Vec<&str> = names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    let now = Local::now().to_rfc3339();

    let rows = cleaned
        .iter()
        .enumerate()
        .map(|(index, name)| schema::benchmark_row_fields(name, index + 1, &now))
        .collect();
    let saved = replace_all(store, tables::BENCHMARK_HOSPITALS, rows).await?;

    let mut csv = Fields::new();
    csv.insert(
        "Benchmark Hospitals".to_string(),
        Value::String(cleaned.join(",")),
    );
    upsert_first(store, tables::BENCHMARK_SETTINGS, csv)
        .await
        .map_err(|source| BatchError {
            completed: 1,
            total: 2,
            source,
        })?;
    Ok(saved)
}

pub async fn hospital_settings(store: &dyn RecordStore) -> Result<Option<HospitalSettings>, StoreError> {
    let rows = store
        .list(tables::HOSPITAL_SETTINGS, &ListQuery::all().max(1))
        .await?;
    Ok(schema::parse_rows(&rows, schema::hospital_settings).into_iter().next())
}

/// Name of the clinic the dashboard reports on, if one is configured.
pub async fn hospital_name(store: &dyn RecordStore) -> Result<Option<String>, StoreError> {
    Ok(hospital_settings(store)
        .await?
        .map(|settings| settings.hospital_name)
        .filter(|name| !name.is_empty()))
}

pub async fn save_hospital_settings(
    store: &dyn RecordStore,
    settings: &HospitalSettings,
) -> Result<(), StoreError> {
    upsert_first(
        store,
        tables::HOSPITAL_SETTINGS,
        schema::hospital_settings_fields(settings),
    )
    .await
}

/// Updates the single settings row of `table`, creating it when absent.
async fn upsert_first(store: &dyn RecordStore, table: &str, fields: Fields) -> Result<(), StoreError> {
    let existing = store.list(table, &ListQuery::all().max(1)).await?;
    match existing.first() {
        Some(row) => {
            store.update(table, &row.id, fields).await?;
        }
        None => {
            store.create(table, vec![fields]).await?;
        }
    }
    Ok(())
}
