use crate::error::{SupabaseError, SupabaseResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use tracker_core::{CoreResult, Message, MessageId, MessageStore, TrackerConfig};
use url::Url;

const REST_PATH: &str = "rest/v1";

/// PostgREST client for the messages table
pub struct RestClient {
    client: reqwest::Client,
    table_url: Url,
    api_key: String,
    schema: String,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: &str, schema: &str, table: &str) -> SupabaseResult<Self> {
        let base = Url::parse(base_url)?;
        let table_url = base.join(&format!("{}/{}", REST_PATH, table))?;

        Ok(Self {
            client: reqwest::Client::new(),
            table_url,
            api_key: api_key.to_string(),
            schema: schema.to_string(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> SupabaseResult<Self> {
        Self::new(
            &config.supabase_url,
            &config.api_key,
            &config.schema,
            &config.table,
        )
    }

    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    /// `select * ... order by received_at desc limit <limit>`
    pub fn recent_url(&self, limit: usize) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "received_at.desc")
            .append_pair("limit", &limit.to_string());
        url
    }

    /// Row filter `id=eq.<id>`
    pub fn row_url(&self, id: &MessageId) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id));
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept-Profile", &self.schema)
            .header("Content-Profile", &self.schema)
    }

    /// Fetch the most recent messages, newest first
    pub async fn list_recent(&self, limit: usize) -> SupabaseResult<Vec<Message>> {
        debug!("Supabase: listing {} most recent messages", limit);

        let response = self
            .request(reqwest::Method::GET, self.recent_url(limit))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::ApiError { status, body });
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| SupabaseError::ParseError(e.to_string()))?;
        let messages = decode_rows(rows);

        info!("Supabase: got {} messages", messages.len());
        Ok(messages)
    }

    /// `update messages set is_read = <is_read> where id = <id>`
    pub async fn update_read(&self, id: &MessageId, is_read: bool) -> SupabaseResult<()> {
        debug!("Supabase: setting is_read={} for {}", is_read, id);

        let response = self
            .request(reqwest::Method::PATCH, self.row_url(id))
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "is_read": is_read }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::ApiError { status, body });
        }

        Ok(())
    }
}

/// Decode rows one by one, skipping any that cannot be read
fn decode_rows(rows: Vec<Value>) -> Vec<Message> {
    let total = rows.len();
    let messages: Vec<Message> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value(row) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("Skipping unreadable message row {}: {}", id, e);
                    None
                }
            }
        })
        .collect();

    if messages.len() < total {
        warn!("Skipped {} of {} message rows", total - messages.len(), total);
    }
    messages
}

#[async_trait]
impl MessageStore for RestClient {
    async fn fetch_recent(&self, limit: usize) -> CoreResult<Vec<Message>> {
        Ok(self.list_recent(limit).await?)
    }

    async fn set_read(&self, id: &MessageId, is_read: bool) -> CoreResult<()> {
        Ok(self.update_read(id, is_read).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> RestClient {
        RestClient::new("https://abcd.supabase.co", "anon", "public", "messages").unwrap()
    }

    #[test]
    fn test_recent_url() {
        let url = client().recent_url(100);
        assert_eq!(
            url.as_str(),
            "https://abcd.supabase.co/rest/v1/messages?select=*&order=received_at.desc&limit=100"
        );
    }

    #[test]
    fn test_row_url() {
        let url = client().row_url(&MessageId::from(42));
        assert_eq!(
            url.as_str(),
            "https://abcd.supabase.co/rest/v1/messages?id=eq.42"
        );
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let rows = vec![
            json!({
                "id": 1,
                "subject": "Field Trip",
                "sender_email": "rivera@school.org",
                "received_at": "2024-09-03T14:22:00+00:00"
            }),
            json!({
                "id": 2,
                "subject": "Lunch menu",
                "sender_email": "office@school.org",
                "received_at": "2024-09-03T14:22:00"
            }),
            json!({
                "id": 3,
                "subject": "Broken",
                "sender_email": "office@school.org",
                "received_at": null
            }),
            json!("not a row"),
        ];

        let messages = decode_rows(rows);
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(messages[0].received_at, messages[1].received_at);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            RestClient::new("not a url", "anon", "public", "messages"),
            Err(SupabaseError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_maps_to_store_error() {
        let err: tracker_core::CoreError = SupabaseError::ApiError {
            status: 401,
            body: "Invalid API key".to_string(),
        }
        .into();
        assert!(matches!(err, tracker_core::CoreError::Store(msg) if msg.contains("401")));
    }
}
