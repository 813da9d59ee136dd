pub mod test_objects;

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    str::FromStr,
};

use bytes::Bytes;
use derive_builder::Builder;
use filevault_utils::add_secs_to_epoch_ms;
use serde::{Deserialize, Serialize};

/// Size of a single chunk on the primary-chunked path.
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Largest payload accepted by either upload path.
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Content type used when the uploader didn't declare one.
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Header carrying the caller's principal on the primary backend API.
pub const PRINCIPAL_HEADER: &str = "x-filevault-principal";

/// Header declaring the total chunk count on chunk downloads.
pub const NUM_CHUNKS_HEADER: &str = "x-filevault-num-chunks";

pub type ChunkIndex = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u64);

impl FileId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Big-endian key so that catalog iteration follows allocation order.
    pub fn key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }

    pub fn chunk_key(&self, chunk_index: ChunkIndex) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&self.0.to_be_bytes());
        key[8..].copy_from_slice(&chunk_index.to_be_bytes());
        key
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<u64> for FileId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Content address handed out by the secondary blob store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(String);

impl BlobId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BlobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque reference to a caller. Identity itself is resolved elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Principal {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum StorageProvider {
    #[default]
    #[serde(rename = "primary-chunked")]
    #[strum(serialize = "primary-chunked")]
    PrimaryChunked,
    #[serde(rename = "secondary-blob")]
    #[strum(serialize = "secondary-blob")]
    SecondaryBlob,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileStatus {
    Pending,
    PartiallyUploaded,
    Uploaded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateMachineMetadata {
    pub next_file_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum UploadFileError {
    NotRequested,
    AlreadyUploaded,
    OutOfOrderChunk { expected: ChunkIndex, received: ChunkIndex },
    ChunkCountMismatch { declared: u64, received: u64 },
}

impl Display for UploadFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadFileError::NotRequested => write!(f, "not_requested"),
            UploadFileError::AlreadyUploaded => write!(f, "already_uploaded"),
            UploadFileError::OutOfOrderChunk { expected, received } => write!(
                f,
                "out_of_order_chunk: expected chunk {}, received chunk {}",
                expected, received
            ),
            UploadFileError::ChunkCountMismatch { declared, received } => write!(
                f,
                "chunk_count_mismatch: declared {} chunks, received {}",
                declared, received
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum RegisterFileError {
    MissingBlobId,
    UnexpectedBlobId,
}

impl Display for RegisterFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterFileError::MissingBlobId => {
                write!(f, "secondary-blob registrations must carry a blob_id")
            }
            RegisterFileError::UnexpectedBlobId => {
                write!(f, "primary-chunked registrations can't carry a blob_id")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub contents: Bytes,
    pub file_type: String,
    pub num_chunks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDownloadResponse {
    NotFoundFile,
    NotUploadedFile,
    PermissionError,
    FoundFile(FileData),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeleteFileResult {
    Ok,
    NotFound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortUploadResult {
    Ok,
    NotFound,
    AlreadyUploaded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileSharingResponse {
    Ok,
    NotFound,
    PendingError,
    PermissionError,
}

/// First call of a chunked upload. Creates the record and carries chunk 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFileAtomicRequest {
    pub name: String,
    pub content: Bytes,
    pub file_type: String,
    pub num_chunks: u64,
    pub owner: Option<Principal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFileContinueRequest {
    pub file_id: FileId,
    pub chunk_index: ChunkIndex,
    pub content: Bytes,
    pub file_type: String,
    pub num_chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterFileRequest {
    pub file_name: String,
    pub storage_provider: StorageProvider,
    #[serde(default)]
    pub blob_id: Option<BlobId>,
    #[serde(default)]
    pub file_type: Option<String>,
    pub requested_at: u64,
    #[serde(default)]
    pub uploaded_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Principal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterFileResponse {
    pub file_id: FileId,
}

/// Catalog view of a file handed out by `list_files`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicFileMetadata {
    pub file_id: FileId,
    pub file_name: String,
    pub file_type: String,
    pub file_status: FileStatus,
    pub storage_provider: StorageProvider,
    pub blob_id: Option<BlobId>,
    pub num_chunks: u64,
    pub requested_at: u64,
    pub uploaded_at: Option<u64>,
    pub shared_with: Vec<Principal>,
    #[serde(default)]
    pub deletion_requested_at: Option<u64>,
}

/// Catalog entry for one logical file, regardless of the backend that
/// holds its bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct FileRecord {
    pub file_id: FileId,
    #[builder(setter(into))]
    pub file_name: String,
    #[builder(setter(into), default = "DEFAULT_FILE_TYPE.to_string()")]
    pub file_type: String,
    pub storage_provider: StorageProvider,
    #[builder(default, setter(into, strip_option))]
    pub blob_id: Option<BlobId>,
    #[builder(default)]
    pub num_chunks: u64,
    #[builder(default)]
    pub chunks_received: u64,
    pub status: FileStatus,
    #[builder(default, setter(strip_option))]
    pub owner: Option<Principal>,
    #[builder(default)]
    pub shared_with: BTreeSet<Principal>,
    pub requested_at: u64,
    #[builder(default, setter(strip_option))]
    pub uploaded_at: Option<u64>,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<u64>,
    #[builder(default, setter(strip_option))]
    pub deletion_requested_at: Option<u64>,
}

impl FileRecordBuilder {
    fn validate(&self) -> Result<(), String> {
        let has_blob = matches!(self.blob_id, Some(Some(_)));
        match self.storage_provider {
            Some(StorageProvider::SecondaryBlob) if !has_blob => {
                Err(RegisterFileError::MissingBlobId.to_string())
            }
            Some(StorageProvider::PrimaryChunked) if has_blob => {
                Err(RegisterFileError::UnexpectedBlobId.to_string())
            }
            _ => Ok(()),
        }
    }
}

impl FileRecord {
    /// Record created by the atomic first-chunk call.
    pub fn new_chunked(
        file_id: FileId,
        request: &UploadFileAtomicRequest,
        now: u64,
        lease_secs: u64,
    ) -> Self {
        let (status, uploaded_at, lease_expires_at) = if request.num_chunks <= 1 {
            (FileStatus::Uploaded, Some(now), None)
        } else {
            (
                FileStatus::PartiallyUploaded,
                None,
                Some(add_secs_to_epoch_ms(now, lease_secs)),
            )
        };
        Self {
            file_id,
            file_name: request.name.clone(),
            file_type: request.file_type.clone(),
            storage_provider: StorageProvider::PrimaryChunked,
            blob_id: None,
            num_chunks: request.num_chunks.max(1),
            chunks_received: 1,
            status,
            owner: request.owner.clone(),
            shared_with: BTreeSet::new(),
            requested_at: now,
            uploaded_at,
            lease_expires_at,
            deletion_requested_at: None,
        }
    }

    /// Record created by a registration call. A registration that carries
    /// `uploaded_at` is complete on arrival, otherwise it stays pending.
    pub fn new_registered(
        file_id: FileId,
        request: &RegisterFileRequest,
    ) -> Result<Self, RegisterFileError> {
        match (&request.storage_provider, &request.blob_id) {
            (StorageProvider::SecondaryBlob, None) => return Err(RegisterFileError::MissingBlobId),
            (StorageProvider::PrimaryChunked, Some(_)) => {
                return Err(RegisterFileError::UnexpectedBlobId)
            }
            _ => {}
        }
        let status = match request.uploaded_at {
            Some(_) => FileStatus::Uploaded,
            None => FileStatus::Pending,
        };
        Ok(Self {
            file_id,
            file_name: request.file_name.clone(),
            file_type: request
                .file_type
                .clone()
                .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
            storage_provider: request.storage_provider,
            blob_id: request.blob_id.clone(),
            num_chunks: 0,
            chunks_received: 0,
            status,
            owner: request.owner.clone(),
            shared_with: BTreeSet::new(),
            requested_at: request.requested_at,
            uploaded_at: request.uploaded_at,
            lease_expires_at: None,
            deletion_requested_at: None,
        })
    }

    pub fn key(&self) -> [u8; 8] {
        self.file_id.key()
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == FileStatus::Uploaded
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.deletion_requested_at.is_some()
    }

    /// Validates a continuation call and advances the record on success.
    ///
    /// Chunks are attributed by their explicit index: the only index accepted
    /// is the next one after the chunks already received.
    pub fn accept_chunk(
        &mut self,
        chunk_index: ChunkIndex,
        num_chunks: u64,
        now: u64,
        lease_secs: u64,
    ) -> Result<(), UploadFileError> {
        if self.storage_provider != StorageProvider::PrimaryChunked ||
            self.is_marked_for_deletion()
        {
            return Err(UploadFileError::NotRequested);
        }
        match self.status {
            FileStatus::Pending => return Err(UploadFileError::NotRequested),
            FileStatus::Uploaded => return Err(UploadFileError::AlreadyUploaded),
            FileStatus::PartiallyUploaded => {}
        }
        if num_chunks != self.num_chunks {
            return Err(UploadFileError::ChunkCountMismatch {
                declared: self.num_chunks,
                received: num_chunks,
            });
        }
        if chunk_index != self.chunks_received {
            return Err(UploadFileError::OutOfOrderChunk {
                expected: self.chunks_received,
                received: chunk_index,
            });
        }

        self.chunks_received += 1;
        if self.chunks_received == self.num_chunks {
            self.status = FileStatus::Uploaded;
            self.uploaded_at = Some(now);
            self.lease_expires_at = None;
        } else {
            self.lease_expires_at = Some(add_secs_to_epoch_ms(now, lease_secs));
        }
        Ok(())
    }

    /// Records without an owner are readable by anyone.
    pub fn is_readable_by(&self, caller: Option<&Principal>) -> bool {
        match (&self.owner, caller) {
            (None, _) => true,
            (Some(owner), Some(caller)) => owner == caller || self.shared_with.contains(caller),
            (Some(_), None) => false,
        }
    }

    pub fn is_owned_by(&self, caller: Option<&Principal>) -> bool {
        match &self.owner {
            None => true,
            Some(owner) => caller == Some(owner),
        }
    }

    /// Checks whether `chunk_index` of this record can be served from the
    /// primary backend. Returns the rejection to send otherwise.
    pub fn check_download(
        &self,
        caller: Option<&Principal>,
        chunk_index: ChunkIndex,
    ) -> Result<(), FileDownloadResponse> {
        if self.is_marked_for_deletion() {
            return Err(FileDownloadResponse::NotFoundFile);
        }
        if !self.is_readable_by(caller) {
            return Err(FileDownloadResponse::PermissionError);
        }
        if self.storage_provider == StorageProvider::SecondaryBlob {
            return Err(FileDownloadResponse::NotFoundFile);
        }
        if !self.is_uploaded() {
            return Err(FileDownloadResponse::NotUploadedFile);
        }
        if chunk_index >= self.num_chunks {
            return Err(FileDownloadResponse::NotFoundFile);
        }
        Ok(())
    }

    pub fn share_with(&mut self, caller: Option<&Principal>, principal: Principal) -> FileSharingResponse {
        if !self.is_owned_by(caller) {
            return FileSharingResponse::PermissionError;
        }
        if self.status == FileStatus::Pending {
            return FileSharingResponse::PendingError;
        }
        self.shared_with.insert(principal);
        FileSharingResponse::Ok
    }

    pub fn lease_expired(&self, now: u64) -> bool {
        self.status == FileStatus::PartiallyUploaded &&
            self.lease_expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl From<FileRecord> for PublicFileMetadata {
    fn from(record: FileRecord) -> Self {
        Self {
            file_id: record.file_id,
            file_name: record.file_name,
            file_type: record.file_type,
            file_status: record.status,
            storage_provider: record.storage_provider,
            blob_id: record.blob_id,
            num_chunks: record.num_chunks,
            requested_at: record.requested_at,
            uploaded_at: record.uploaded_at,
            shared_with: record.shared_with.into_iter().collect(),
            deletion_requested_at: record.deletion_requested_at,
        }
    }
}
