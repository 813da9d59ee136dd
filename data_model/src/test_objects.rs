pub mod tests {
    use bytes::Bytes;

    use crate::{
        BlobId,
        FileId,
        FileRecord,
        FileRecordBuilder,
        FileStatus,
        RegisterFileRequest,
        StorageProvider,
        UploadFileAtomicRequest,
    };

    pub const TEST_FILE_TYPE: &str = "text/plain";
    pub const TEST_OWNER: &str = "test_owner";

    pub fn mock_atomic_request(name: &str, content: &[u8], num_chunks: u64) -> UploadFileAtomicRequest {
        UploadFileAtomicRequest {
            name: name.to_string(),
            content: Bytes::copy_from_slice(content),
            file_type: TEST_FILE_TYPE.to_string(),
            num_chunks,
            owner: None,
        }
    }

    pub fn mock_blob_registration(
        name: &str,
        blob_id: &str,
        uploaded_at: Option<u64>,
    ) -> RegisterFileRequest {
        RegisterFileRequest {
            file_name: name.to_string(),
            storage_provider: StorageProvider::SecondaryBlob,
            blob_id: Some(BlobId::from(blob_id)),
            file_type: Some(TEST_FILE_TYPE.to_string()),
            requested_at: 1000,
            uploaded_at,
            owner: None,
        }
    }

    pub fn mock_uploaded_record(file_id: u64, name: &str) -> FileRecord {
        FileRecordBuilder::default()
            .file_id(FileId::new(file_id))
            .file_name(name)
            .file_type(TEST_FILE_TYPE)
            .storage_provider(StorageProvider::PrimaryChunked)
            .num_chunks(1)
            .chunks_received(1)
            .status(FileStatus::Uploaded)
            .requested_at(1000)
            .uploaded_at(1000)
            .build()
            .unwrap()
    }
}
