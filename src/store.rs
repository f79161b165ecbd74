use crate::errors::StoreError;
use crate::models::Attachment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column name to cell value, as the store returns it.
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

impl RawRecord {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// First non-empty string among `names`.
    pub fn str_any(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.str_field(name))
            .find(|value| !value.trim().is_empty())
    }

    /// First numeric value among `names`; numeric strings are accepted too.
    pub fn num_any(&self, names: &[&str]) -> Option<f64> {
        names.iter().find_map(|name| match self.fields.get(*name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn bool_field(&self, name: &str) -> bool {
        matches!(self.fields.get(name), Some(Value::Bool(true)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEquals {
    pub field: String,
    pub value: String,
}

impl FieldEquals {
    /// Airtable formula form, with single quotes doubled.
    pub fn to_formula(&self) -> String {
        format!("{{{}}} = '{}'", self.field, self.value.replace('\'', "''"))
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        match record.fields.get(&self.field) {
            Some(Value::String(s)) => s == &self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub max_records: Option<usize>,
    pub sort: Option<(String, SortDirection)>,
    pub filter: Vec<FieldEquals>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn max(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn sort(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort = Some((field.to_string(), direction));
        self
    }

    pub fn where_eq(mut self, field: &str, value: &str) -> Self {
        self.filter.push(FieldEquals {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Combined formula for all equality filters, if any.
    pub fn formula(&self) -> Option<String> {
        match self.filter.len() {
            0 => None,
            1 => Some(self.filter[0].to_formula()),
            _ => {
                let parts: Vec<String> = self.filter.iter().map(FieldEquals::to_formula).collect();
                Some(format!("AND({})", parts.join(", ")))
            }
        }
    }
}

/// File bytes destined for an attachment column.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The external record store seen as flat tables of rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<RawRecord>, StoreError>;

    async fn find(&self, table: &str, id: &str) -> Result<Option<RawRecord>, StoreError>;

    /// Creates up to one batch of rows; callers chunk through `batch`.
    async fn create(&self, table: &str, rows: Vec<Fields>) -> Result<Vec<RawRecord>, StoreError>;

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<RawRecord, StoreError>;

    /// Destroys up to one batch of rows; callers chunk through `batch`.
    async fn destroy(&self, table: &str, ids: &[String]) -> Result<(), StoreError>;

    /// Appends a file to an attachment column and returns the column's attachments.
    async fn upload_attachment(
        &self,
        table: &str,
        record_id: &str,
        field: &str,
        upload: AttachmentUpload,
    ) -> Result<Vec<Attachment>, StoreError>;
}
