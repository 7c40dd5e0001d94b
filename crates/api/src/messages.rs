use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk endpoint
// ---------------------------------------------------------------------------

/// Body for `POST {api}/document/upload/chunk`.
///
/// The `chunk_data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkUploadRequest {
    pub session_id: String,
    pub chunk_index: u32,
    #[serde(with = "base64_bytes")]
    pub chunk_data: Vec<u8>,
    pub chunk_checksum: String,
    pub total_chunks: u32,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
}

/// Response from the chunk endpoint.
///
/// Either field may appear on any chunk: the backend can hand off to a
/// direct signed-URL write mid-transfer, in which case `signed_url` must be
/// captured for subsequent chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Whole-file signed upload endpoint
// ---------------------------------------------------------------------------

/// One file entry in a signed upload request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUploadFile {
    pub filename: String,
    pub file_type: String,
    pub file_size_bytes: u64,
    pub document_type: String,
}

/// Body for `POST {api}/document/upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUploadRequest {
    pub files: Vec<SignedUploadFile>,
    pub image_batches: Vec<serde_json::Value>,
}

/// A signed URL plus the storage-policy form fields to send with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUrlEntry {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Response from the signed upload endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedUploadResponse {
    #[serde(default)]
    pub signed_urls: Vec<SignedUrlEntry>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_job_id: Option<String>,
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
