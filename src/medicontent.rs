use crate::errors::StoreError;
use crate::models::{
    Attachment, DataRequestInput, ImageType, MedicontentPost, NewCommunication, PostCommunication,
};
use crate::schema::{self, tables};
use crate::store::{AttachmentUpload, Fields, ListQuery, RecordStore, SortDirection};
use chrono::Local;
use serde_json::Value;
use tracing::{debug, info, warn};

const RECENT_ACTIVITY_LIMIT: usize = 10;
/// Post status once the clinic starts supplying material.
const HOSPITAL_WORKING: &str = "병원 작업 중";
const REQUEST_PENDING: &str = "대기";

pub async fn posts(store: &dyn RecordStore) -> Result<Vec<MedicontentPost>, StoreError> {
    let rows = store
        .list(
            tables::MEDICONTENT_POSTS,
            &ListQuery::all().sort("Publish Date", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::medicontent_post))
}

pub async fn post(store: &dyn RecordStore, id: &str) -> Result<Option<MedicontentPost>, StoreError> {
    let Some(row) = store.find(tables::MEDICONTENT_POSTS, id).await? else {
        return Ok(None);
    };
    Ok(schema::parse_rows(std::slice::from_ref(&row), schema::medicontent_post)
        .into_iter()
        .next())
}

pub async fn update_status(store: &dyn RecordStore, id: &str, status: &str) -> Result<(), StoreError> {
    let mut fields = Fields::new();
    fields.insert("Status".to_string(), Value::String(status.to_string()));
    fields.insert(
        "Updated At".to_string(),
        Value::String(Local::now().to_rfc3339()),
    );
    store.update(tables::MEDICONTENT_POSTS, id, fields).await?;
    info!(id, status, "post status updated");
    Ok(())
}

/// Record id of the data request for `post_id`, created on first use.
pub async fn find_or_create_data_request(store: &dyn RecordStore, post_id: &str) -> Result<String, StoreError> {
    let existing = store
        .list(
            tables::POST_DATA_REQUESTS,
            &ListQuery::all().where_eq("Post ID", post_id).max(1),
        )
        .await?;
    if let Some(row) = existing.into_iter().next() {
        return Ok(row.id);
    }

    let mut fields = Fields::new();
    fields.insert("Post ID".to_string(), Value::String(post_id.to_string()));
    fields.insert("Status".to_string(), Value::String(HOSPITAL_WORKING.to_string()));
    let created = store.create(tables::POST_DATA_REQUESTS, vec![fields]).await?;
    created
        .into_iter()
        .next()
        .map(|row| row.id)
        .ok_or_else(|| StoreError::Decode("create returned no record".to_string()))
}

/// Attaches each image to the post's data request. Non-image files are skipped.
pub async fn upload_images(
    store: &dyn RecordStore,
    post_id: &str,
    image_type: ImageType,
    files: Vec<AttachmentUpload>,
) -> Result<Vec<Attachment>, StoreError> {
    let record_id = find_or_create_data_request(store, post_id).await?;
    let field = image_type.field_name();

    let mut uploaded = Vec::new();
    for file in files {
        if !file.content_type.starts_with("image/") {
            debug!(filename = %file.filename, content_type = %file.content_type, "skipping non-image upload");
            continue;
        }
        let filename = file.filename.clone();
        let attachments = store
            .upload_attachment(tables::POST_DATA_REQUESTS, &record_id, field, file)
            .await?;
        if let Some(attachment) = attachments.into_iter().rev().find(|a| a.filename == filename) {
            uploaded.push(attachment);
        }
    }
    info!(post_id, field, count = uploaded.len(), "images uploaded");
    Ok(uploaded)
}

/// Messages on one post, newest first.
pub async fn communications(store: &dyn RecordStore, post_id: &str) -> Result<Vec<PostCommunication>, StoreError> {
    let rows = store
        .list(
            tables::POST_COMMUNICATIONS,
            &ListQuery::all()
                .where_eq("Post ID", post_id)
                .sort("Timestamp", SortDirection::Desc),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::post_communication))
}

/// The latest messages across every post.
pub async fn recent_activity(store: &dyn RecordStore) -> Result<Vec<PostCommunication>, StoreError> {
    let rows = store
        .list(
            tables::POST_COMMUNICATIONS,
            &ListQuery::all()
                .sort("Timestamp", SortDirection::Desc)
                .max(RECENT_ACTIVITY_LIMIT),
        )
        .await?;
    Ok(schema::parse_rows(&rows, schema::post_communication))
}

pub async fn add_communication(store: &dyn RecordStore, message: &NewCommunication) -> Result<(), StoreError> {
    let fields = schema::communication_fields(message, &Local::now().to_rfc3339());
    store.create(tables::POST_COMMUNICATIONS, vec![fields]).await?;
    info!(post_id = %message.post_id, sender = %message.sender, "communication added");
    Ok(())
}

/// Moves the post into the clinic-working state. A missing post is only logged.
async fn mark_hospital_working(store: &dyn RecordStore, post_id: &str) -> Result<(), StoreError> {
    match store.find(tables::MEDICONTENT_POSTS, post_id).await? {
        Some(_) => update_status(store, post_id, HOSPITAL_WORKING).await,
        None => {
            warn!(post_id, "no medicontent post for data request");
            Ok(())
        }
    }
}

/// Stores a new data request as pending and returns its record id.
pub async fn submit_data_request(store: &dyn RecordStore, input: &DataRequestInput) -> Result<String, StoreError> {
    let post_id = input.post_id.clone().unwrap_or_default();
    let mut fields = schema::data_request_fields(input);
    fields.insert("Post ID".to_string(), Value::String(post_id.clone()));
    fields.insert(
        "Submitted At".to_string(),
        Value::String(Local::now().to_rfc3339()),
    );
    fields.insert("Status".to_string(), Value::String(REQUEST_PENDING.to_string()));

    let created = store.create(tables::POST_DATA_REQUESTS, vec![fields]).await?;
    let id = created
        .into_iter()
        .next()
        .map(|row| row.id)
        .ok_or_else(|| StoreError::Decode("create returned no record".to_string()))?;
    if !post_id.is_empty() {
        mark_hospital_working(store, &post_id).await?;
    }
    info!(id = %id, post_id = %post_id, "data request submitted");
    Ok(id)
}

/// Applies the fields present in `input` to request `id`.
pub async fn update_data_request(
    store: &dyn RecordStore,
    id: &str,
    input: &DataRequestInput,
) -> Result<(), StoreError> {
    let updated = store
        .update(tables::POST_DATA_REQUESTS, id, schema::data_request_fields(input))
        .await?;
    let post_id = input
        .post_id
        .clone()
        .or_else(|| updated.str_field("Post ID").map(str::to_string))
        .unwrap_or_default();
    if !post_id.is_empty() {
        mark_hospital_working(store, &post_id).await?;
    }
    info!(id, "data request updated");
    Ok(())
}
