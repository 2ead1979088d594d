use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content-addressed record for an uploaded file; `file_hash` is the
/// sha256 hex digest and primary key. Duplicate uploads are no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_hash: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// Extensions the upload endpoint accepts.
pub const ALLOWED_EXTENSIONS: &[&str] =
&["wav", "bin", "txt", "yml", "yaml", "py", "grc"];

/// Maximum accepted upload size: 100 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
