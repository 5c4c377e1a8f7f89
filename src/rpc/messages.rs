// ===========================================================================
// rpc/messages - Request & Response Types
// ===========================================================================
//
// JSON encoding follows the protobuf JSON mapping: lowerCamelCase names,
// enums as their value names, `bytes` as base64 and default values omitted.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    #[serde(rename = "CHANGE_STATUS_DEFINING")]
    Defining,

    #[serde(rename = "CHANGE_STATUS_HAPPENING")]
    Happening,

    #[serde(rename = "CHANGE_STATUS_PROCESSING")]
    Processing,

    #[serde(rename = "CHANGE_STATUS_DONE")]
    Done,

    #[default]
    #[serde(rename = "CHANGE_STATUS_UNSPECIFIED", other)]
    Unspecified,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeStatus::Defining => "defining",
            ChangeStatus::Happening => "happening",
            ChangeStatus::Processing => "processing",
            ChangeStatus::Done => "done",
            ChangeStatus::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

/// Progress of the snapshot taken while a change starts or ends
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotState {
    #[serde(rename = "STATE_TAKING_SNAPSHOT")]
    TakingSnapshot,

    #[serde(rename = "STATE_SAVING_SNAPSHOT")]
    SavingSnapshot,

    #[serde(rename = "STATE_DONE")]
    Done,

    #[default]
    #[serde(rename = "STATE_UNSPECIFIED", other)]
    Unspecified,
}

impl SnapshotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotState::TakingSnapshot => "STATE_TAKING_SNAPSHOT",
            SnapshotState::SavingSnapshot => "STATE_SAVING_SNAPSHOT",
            SnapshotState::Done => "STATE_DONE",
            SnapshotState::Unspecified => "STATE_UNSPECIFIED",
        }
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// changes.ChangesService
// ---------------------------------------------------------------------------

/// Request body shared by StartChange and EndChange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTransitionRequest {
    #[serde(rename = "changeUUID", with = "uuid_bytes")]
    pub change_uuid: Uuid,
}

pub type StartChangeRequest = ChangeTransitionRequest;
pub type EndChangeRequest = ChangeTransitionRequest;

/// Streamed progress of StartChange and EndChange
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProgress {
    #[serde(default)]
    pub state: SnapshotState,

    #[serde(default)]
    pub num_items: u32,

    #[serde(default)]
    pub num_edges: u32,
}

pub type StartChangeResponse = ChangeProgress;
pub type EndChangeResponse = ChangeProgress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChangesByStatusRequest {
    pub status: ChangeStatus,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChangesByStatusResponse {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub metadata: ChangeMetadata,

    #[serde(default)]
    pub properties: ChangeProperties,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    #[serde(rename = "UUID", default, with = "uuid_bytes")]
    pub uuid: Uuid,

    #[serde(default)]
    pub status: ChangeStatus,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeProperties {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub ticket_link: String,
}

// ---------------------------------------------------------------------------
// bookmarks.BookmarksService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAffectedBookmarksRequest {
    #[serde(rename = "snapshotUUID", with = "uuid_bytes")]
    pub snapshot_uuid: Uuid,

    #[serde(rename = "bookmarkUUIDs", default, with = "uuid_bytes_list")]
    pub bookmark_uuids: Vec<Uuid>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAffectedBookmarksResponse {
    /// Raw identifiers; validated by `bookmark_uuids`
    #[serde(rename = "bookmarkUUIDs", default, with = "bytes_list")]
    pub raw_bookmark_uuids: Vec<Vec<u8>>,
}

impl GetAffectedBookmarksResponse {
    pub fn bookmark_uuids(&self) -> Result<Vec<Uuid>, uuid::Error> {
        self.raw_bookmark_uuids
            .iter()
            .map(|raw| Uuid::from_slice(raw))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// apikeys.ApiKeyService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeKeyForTokenRequest {
    pub api_key: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeKeyForTokenResponse {
    #[serde(default)]
    pub access_token: String,
}

// ---------------------------------------------------------------------------
// base64 `bytes` fields
// ---------------------------------------------------------------------------

fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    use base64::Engine;

    // Encoders emit standard base64; decoders must also accept the URL-safe
    // alphabet, padded or not.
    STANDARD
        .decode(value)
        .or_else(|_| STANDARD_NO_PAD.decode(value))
        .or_else(|_| URL_SAFE.decode(value))
        .or_else(|_| URL_SAFE_NO_PAD.decode(value))
}

fn encode_base64(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    STANDARD.encode(bytes)
}

mod uuid_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(uuid.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let raw = super::decode_base64(&encoded).map_err(D::Error::custom)?;
        Uuid::from_slice(&raw).map_err(D::Error::custom)
    }
}

mod uuid_bytes_list {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(uuids: &[Uuid], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(uuids.iter().map(|u| super::encode_base64(u.as_bytes())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Uuid>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|encoded| {
                let raw = super::decode_base64(encoded).map_err(D::Error::custom)?;
                Uuid::from_slice(&raw).map_err(D::Error::custom)
            })
            .collect()
    }
}

mod bytes_list {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|b| super::encode_base64(b)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|encoded| super::decode_base64(encoded).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHANGE: &str = "7f1c3d3e-6a52-4c38-9a3f-2b2f1c0d9e11";

    #[test]
    fn test_transition_request_encodes_uuid_as_base64() {
        let uuid = Uuid::parse_str(CHANGE).unwrap();
        let value = serde_json::to_value(EndChangeRequest { change_uuid: uuid }).unwrap();
        assert_eq!(value, json!({ "changeUUID": "fxw9PmpSTDiaPysvHA2eEQ==" }));
    }

    #[test]
    fn test_progress_defaults_when_fields_omitted() {
        let progress: ChangeProgress = serde_json::from_str("{}").unwrap();
        assert_eq!(progress.state, SnapshotState::Unspecified);
        assert_eq!(progress.num_items, 0);
        assert_eq!(progress.num_edges, 0);

        let progress: ChangeProgress = serde_json::from_value(json!({
            "state": "STATE_TAKING_SNAPSHOT",
            "numItems": 12,
            "numEdges": 30
        }))
        .unwrap();
        assert_eq!(progress.state, SnapshotState::TakingSnapshot);
        assert_eq!(progress.num_items, 12);
        assert_eq!(progress.num_edges, 30);
    }

    #[test]
    fn test_unknown_enum_value_maps_to_unspecified() {
        let progress: ChangeProgress =
            serde_json::from_value(json!({ "state": "STATE_FROM_THE_FUTURE" })).unwrap();
        assert_eq!(progress.state, SnapshotState::Unspecified);
    }

    #[test]
    fn test_list_changes_request_uses_enum_name() {
        let request = ListChangesByStatusRequest {
            status: ChangeStatus::Happening,
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({ "status": "CHANGE_STATUS_HAPPENING" })
        );
    }

    #[test]
    fn test_list_changes_response_ignores_unknown_fields() {
        let response: ListChangesByStatusResponse = serde_json::from_value(json!({
            "changes": [{
                "metadata": {
                    "UUID": "fxw9PmpSTDiaPysvHA2eEQ==",
                    "status": "CHANGE_STATUS_HAPPENING",
                    "createdAt": "2024-01-15T10:30:00Z"
                },
                "properties": {
                    "title": "Upgrade database",
                    "ticketLink": "https://tickets.example.com/OPS-1"
                }
            }]
        }))
        .unwrap();

        let change = &response.changes[0];
        assert_eq!(change.metadata.uuid.to_string(), CHANGE);
        assert_eq!(change.metadata.status, ChangeStatus::Happening);
        assert_eq!(change.properties.ticket_link, "https://tickets.example.com/OPS-1");
    }

    #[test]
    fn test_url_safe_base64_accepted() {
        let metadata: ChangeMetadata =
            serde_json::from_value(json!({ "UUID": "fxw9PmpSTDiaPysvHA2eEQ" })).unwrap();
        assert_eq!(metadata.uuid.to_string(), CHANGE);
    }

    #[test]
    fn test_affected_bookmarks_roundtrip_fields() {
        let snapshot = Uuid::new_v4();
        let bookmarks = vec![Uuid::new_v4(), Uuid::new_v4()];
        let request = GetAffectedBookmarksRequest {
            snapshot_uuid: snapshot,
            bookmark_uuids: bookmarks.clone(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("snapshotUUID").is_some());
        assert_eq!(value["bookmarkUUIDs"].as_array().unwrap().len(), 2);

        let response: GetAffectedBookmarksResponse =
            serde_json::from_value(json!({ "bookmarkUUIDs": value["bookmarkUUIDs"] })).unwrap();
        assert_eq!(response.bookmark_uuids().unwrap(), bookmarks);
    }

    #[test]
    fn test_affected_bookmarks_rejects_short_uuid() {
        let response: GetAffectedBookmarksResponse =
            serde_json::from_value(json!({ "bookmarkUUIDs": ["AAEC"] })).unwrap();
        assert!(response.bookmark_uuids().is_err());
    }

    #[test]
    fn test_empty_affected_bookmarks() {
        let response: GetAffectedBookmarksResponse = serde_json::from_str("{}").unwrap();
        assert!(response.bookmark_uuids().unwrap().is_empty());
    }

    #[test]
    fn test_exchange_key_field_names() {
        let request = ExchangeKeyForTokenRequest {
            api_key: "ovm_api_abc".into(),
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({ "apiKey": "ovm_api_abc" })
        );

        let response: ExchangeKeyForTokenResponse =
            serde_json::from_value(json!({ "accessToken": "tok" })).unwrap();
        assert_eq!(response.access_token, "tok");
    }

    #[test]
    fn test_change_status_display() {
        assert_eq!(ChangeStatus::Happening.to_string(), "happening");
        assert_eq!(SnapshotState::SavingSnapshot.to_string(), "STATE_SAVING_SNAPSHOT");
    }
}
