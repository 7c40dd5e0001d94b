//! Wire types for the document upload API.
//!
//! Request/response bodies for the chunk endpoint, the whole-file signed
//! upload endpoint, and the file-type translation table the two backends
//! disagree on.

pub mod messages;
pub mod types;

pub use messages::{
    ChunkUploadRequest, ChunkUploadResponse, SignedUploadFile, SignedUploadRequest,
    SignedUploadResponse, SignedUrlEntry,
};
pub use types::FileKind;
