use crate::errors::StoreError;
use crate::models::Attachment;
use crate::store::{AttachmentUpload, Fields, ListQuery, RawRecord, RecordStore};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;

const API_URL: &str = "https://api.airtable.com/v0";
const CONTENT_URL: &str = "https://content.airtable.com/v0";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<RawRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordsEnvelope {
    #[serde(default)]
    records: Vec<RawRecord>,
}

/// Airtable REST client. Every call is bounded by the client timeout.
pub struct AirtableClient {
    http: Client,
    api_key: String,
    base_id: String,
    api_url: String,
    content_url: String,
    timeout: Duration,
}

impl AirtableClient {
    pub fn new(api_key: &str, base_id: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_id: base_id.to_string(),
            api_url: API_URL.to_string(),
            content_url: CONTENT_URL.to_string(),
            timeout,
        })
    }

    fn url(&self, root: &str, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(root).map_err(|err| StoreError::Decode(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Decode(format!("cannot extend url {root}")))?
            .push(&self.base_id)
            .extend(segments);
        Ok(url)
    }

    fn classify(&self, operation: &str, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::DeadlineExceeded {
                operation: operation.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            StoreError::Http(err)
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        let start = Instant::now();
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| self.classify(operation, err))?;

        let status = response.status();
        debug!(
            operation,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "store call finished"
        );
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        response: Response,
    ) -> Result<T, StoreError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.classify(operation, err))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn list_params(query: &ListQuery, offset: Option<&str>) -> Vec<(String, String)> {
    let mut params = vec![("pageSize".to_string(), PAGE_SIZE.to_string())];
    if let Some(max) = query.max_records {
        params.push(("maxRecords".to_string(), max.to_string()));
    }
    if let Some((field, direction)) = &query.sort {
        params.push(("sort[0][field]".to_string(), field.clone()));
        params.push(("sort[0][direction]".to_string(), direction.as_str().to_string()));
    }
    if let Some(formula) = query.formula() {
        params.push(("filterByFormula".to_string(), formula));
    }
    if let Some(offset) = offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}

/// Attachments for `field` in an upload response. The response may key the
/// column by id instead of name, so any attachment array is accepted.
fn uploaded_attachments(fields: &Fields, field: &str) -> Vec<Attachment> {
    let parse = |value: &Value| serde_json::from_value::<Vec<Attachment>>(value.clone()).ok();
    fields
        .get(field)
        .and_then(parse)
        .or_else(|| fields.values().filter(|v| v.is_array()).find_map(parse))
        .unwrap_or_default()
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<RawRecord>, StoreError> {
        let url = self.url(&self.api_url, &[table])?;
        let operation = format!("list {table}");
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let request = self
                .http
                .get(url.clone())
                .query(&list_params(query, offset.as_deref()));
            let response = self.send(&operation, request).await?;
            let page: ListPage = self.read_json(&operation, response).await?;
            records.extend(page.records);

            let reached_max = query.max_records.is_some_and(|max| records.len() >= max);
            match page.offset {
                Some(next) if !reached_max => offset = Some(next),
                _ => break,
            }
        }

        if let Some(max) = query.max_records {
            records.truncate(max);
        }
        Ok(records)
    }

    async fn find(&self, table: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
        let url = self.url(&self.api_url, &[table, id])?;
        let operation = format!("find {table}/{id}");
        match self.send(&operation, self.http.get(url)).await {
            Ok(response) => Ok(Some(self.read_json(&operation, response).await?)),
            Err(StoreError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn create(&self, table: &str, rows: Vec<Fields>) -> Result<Vec<RawRecord>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&self.api_url, &[table])?;
        let operation = format!("create {table}");
        let records: Vec<Value> = rows.into_iter().map(|fields| json!({ "fields": fields })).collect();
        let body = json!({ "records": records, "typecast": true });

        let response = self.send(&operation, self.http.post(url).json(&body)).await?;
        let envelope: RecordsEnvelope = self.read_json(&operation, response).await?;
        Ok(envelope.records)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<RawRecord, StoreError> {
        let url = self.url(&self.api_url, &[table, id])?;
        let operation = format!("update {table}/{id}");
        let body = json!({ "fields": fields, "typecast": true });
        let response = self.send(&operation, self.http.patch(url).json(&body)).await?;
        self.read_json(&operation, response).await
    }

    async fn destroy(&self, table: &str, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = self.url(&self.api_url, &[table])?;
        let operation = format!("destroy {table}");
        let params: Vec<(&str, &str)> = ids.iter().map(|id| ("records[]", id.as_str())).collect();
        self.send(&operation, self.http.delete(url).query(&params))
            .await?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        _table: &str,
        record_id: &str,
        field: &str,
        upload: AttachmentUpload,
    ) -> Result<Vec<Attachment>, StoreError> {
        let url = self.url(&self.content_url, &[record_id, field, "uploadAttachment"])?;
        let operation = format!("upload {record_id}/{field}");
        let body = json!({
            "contentType": upload.content_type,
            "file": general_purpose::STANDARD.encode(&upload.bytes),
            "filename": upload.filename,
        });

        let response = self.send(&operation, self.http.post(url).json(&body)).await?;
        let record: RawRecord = self.read_json(&operation, response).await?;
        Ok(uploaded_attachments(&record.fields, field))
    }
}
