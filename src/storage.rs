use crate::errors::StoreError;
use crate::models::Attachment;
use crate::store::{AttachmentUpload, Fields, ListQuery, RawRecord, RecordStore, SortDirection};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreData {
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<RawRecord>>,
    #[serde(default)]
    pub next_id: u64,
}

/// A record store kept in a JSON file, for local runs and tests.
pub struct LocalStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::with_data(StoreData::default())
    }

    pub fn with_data(data: StoreData) -> Self {
        Self {
            path: None,
            data: Mutex::new(data),
        }
    }

    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = load_data(&path).await;
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => persist_data(path, data).await,
            None => Ok(()),
        }
    }

    /// Writes `next` out, and only then makes it the live state.
    async fn commit(&self, data: &mut StoreData, next: StoreData) -> Result<(), StoreError> {
        self.persist(&next).await?;
        *data = next;
        Ok(())
    }
}

pub async fn load_data(path: &Path) -> StoreData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                StoreData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            StoreData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn not_found(table: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        table: table.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<RawRecord>, StoreError> {
        let data = self.data.lock().await;
        let mut rows: Vec<RawRecord> = data
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.sort {
            rows.sort_by(|a, b| {
                let ordering = compare_cells(a.fields.get(field), b.fields.get(field));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(max) = query.max_records {
            rows.truncate(max);
        }
        Ok(rows)
    }

    async fn find(&self, table: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| row.id == id).cloned()))
    }

    async fn create(&self, table: &str, rows: Vec<Fields>) -> Result<Vec<RawRecord>, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let now = Local::now().to_rfc3339();
        let mut created = Vec::with_capacity(rows.len());
        for fields in rows {
            next.next_id += 1;
            created.push(RawRecord {
                id: format!("rec{:014}", next.next_id),
                created_time: Some(now.clone()),
                fields,
            });
        }
        next.tables
            .entry(table.to_string())
            .or_default()
            .extend(created.iter().cloned());
        self.commit(&mut data, next).await?;
        Ok(created)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<RawRecord, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let updated = {
            let row = next
                .tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| row.id == id))
                .ok_or_else(|| not_found(table, id))?;
            row.fields.extend(fields);
            row.clone()
        };
        self.commit(&mut data, next).await?;
        Ok(updated)
    }

    async fn destroy(&self, table: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        if let Some(rows) = next.tables.get_mut(table) {
            rows.retain(|row| !ids.contains(&row.id));
        }
        self.commit(&mut data, next).await
    }

    async fn upload_attachment(
        &self,
        table: &str,
        record_id: &str,
        field: &str,
        upload: AttachmentUpload,
    ) -> Result<Vec<Attachment>, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        next.next_id += 1;
        let attachment = Attachment {
            id: format!("att{:014}", next.next_id),
            url: format!("local://{table}/{record_id}/{}", upload.filename),
            filename: upload.filename,
            size: upload.bytes.len() as u64,
            content_type: upload.content_type,
        };

        let attachments = {
            let row = next
                .tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| row.id == record_id))
                .ok_or_else(|| not_found(table, record_id))?;
            let mut attachments: Vec<Attachment> = row
                .fields
                .get(field)
                .cloned()
                .and_then(|value| serde_json::from_value(value).ok())
                .unwrap_or_default();
            attachments.push(attachment);
            row.fields
                .insert(field.to_string(), serde_json::to_value(&attachments)?);
            attachments
        };
        self.commit(&mut data, next).await?;
        Ok(attachments)
    }
}
