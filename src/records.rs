//! Wire shapes of the record collection and sync endpoints.

use serde::Deserialize;

/// A record as returned by the collection endpoint. The payload is opaque
/// to the worker; only the identifier is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRecord {
    pub id: String,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// One page of `GET /api/records`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    pub data: Vec<SyncRecord>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub has_more: bool,
}

/// Response of `POST /api/records/<id>/sync`. `success = false` is a
/// failure carrying `message` as the error text.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub record_id: String,
    pub synced_at: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_its_payload_opaque() {
        let record: SyncRecord = serde_json::from_str(
            r#"{"id":"rec-1","name":"first","metrics":{"clicks":10}}"#,
        )
        .unwrap();
        assert_eq!(record.id, "rec-1");
        assert_eq!(record.payload["name"], "first");
        assert_eq!(record.payload["metrics"]["clicks"], 10);
    }

    #[test]
    fn page_decodes_pagination() {
        let page: RecordPage = serde_json::from_str(
            r#"{"data":[{"id":"a"}],"pagination":{"page":1,"per_page":50,"total":1,"has_more":false}}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(!page.pagination.has_more);
    }

    #[test]
    fn sync_response_message_is_optional() {
        let ok: SyncResponse = serde_json::from_str(
            r#"{"success":true,"record_id":"a","synced_at":"2026-08-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(ok.success);
        assert!(ok.message.is_none());

        let failed: SyncResponse = serde_json::from_str(
            r#"{"success":false,"record_id":"a","synced_at":"2026-08-01T00:00:00Z","message":"record locked"}"#,
        )
        .unwrap();
        assert_eq!(failed.message.as_deref(), Some("record locked"));
    }
}
