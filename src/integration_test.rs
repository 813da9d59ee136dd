#[cfg(test)]
mod tests {
    use anyhow::Result;
    use blob_store::ContentStore;
    use bytes::Bytes;
    use data_model::{
        AbortUploadResult,
        BlobId,
        DeleteFileResult,
        FileDownloadResponse,
        FileId,
        FileSharingResponse,
        FileStatus,
        Principal,
        RegisterFileRequest,
        StorageProvider,
        UploadFileAtomicRequest,
        UploadFileContinueRequest,
        DEFAULT_CHUNK_SIZE,
        MAX_UPLOAD_SIZE,
    };
    use filevault_client::{
        chunker::Chunker,
        coordinator::UploadRequest,
        remote_store::PrimaryBackend,
        FileVaultError,
    };
    use tokio::sync::watch;

    use crate::testing::TestService;

    fn atomic(name: &str, content: Bytes, num_chunks: u64) -> UploadFileAtomicRequest {
        UploadFileAtomicRequest {
            name: name.to_string(),
            content,
            file_type: "text/plain".to_string(),
            num_chunks,
            owner: None,
        }
    }

    fn continuation(
        file_id: FileId,
        chunk_index: u64,
        content: Bytes,
        num_chunks: u64,
    ) -> UploadFileContinueRequest {
        UploadFileContinueRequest {
            file_id,
            chunk_index,
            content,
            file_type: "text/plain".to_string(),
            num_chunks,
        }
    }

    fn upload_request(name: &str, contents: Bytes, provider: StorageProvider) -> UploadRequest {
        UploadRequest {
            file_name: name.to_string(),
            file_type: "text/plain".to_string(),
            contents,
            storage_provider: provider,
        }
    }

    #[tokio::test]
    async fn test_single_chunk_round_trip() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(None)?;

        let contents = Bytes::from_static(b"hello filevault");
        let file_id = backend
            .upload_file_atomic(atomic("hello.txt", contents.clone(), 1))
            .await?;

        let FileDownloadResponse::FoundFile(data) = backend.download_file(file_id, 0).await? else {
            panic!("expected the uploaded chunk");
        };
        assert_eq!(data.contents, contents);
        assert_eq!(data.file_type, "text/plain");
        assert_eq!(data.num_chunks, 1);

        assert_eq!(
            backend.download_file(file_id, 1).await?,
            FileDownloadResponse::NotFoundFile
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_five_mib_upload_progresses_through_three_chunks() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(None)?;

        let payload: Bytes = (0..5 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let chunker = Chunker::new(payload.clone(), DEFAULT_CHUNK_SIZE)?;
        assert_eq!(chunker.num_chunks(), 3);
        let mut chunks = chunker.chunks();

        let file_id = backend
            .upload_file_atomic(atomic("big.bin", chunks.next().unwrap(), 3))
            .await?;
        let status = |file: Option<data_model::PublicFileMetadata>| file.unwrap().file_status;
        assert_eq!(
            status(backend.get_file(file_id).await?),
            FileStatus::PartiallyUploaded
        );
        assert_eq!(
            backend.download_file(file_id, 0).await?,
            FileDownloadResponse::NotUploadedFile
        );

        backend
            .upload_file_continue(continuation(file_id, 1, chunks.next().unwrap(), 3))
            .await?;
        assert_eq!(
            status(backend.get_file(file_id).await?),
            FileStatus::PartiallyUploaded
        );

        backend
            .upload_file_continue(continuation(file_id, 2, chunks.next().unwrap(), 3))
            .await?;
        assert_eq!(
            status(backend.get_file(file_id).await?),
            FileStatus::Uploaded
        );

        let downloaded = test_srv.vault(None)?.download(file_id).await?;
        assert_eq!(downloaded.contents, payload);
        Ok(())
    }

    #[tokio::test]
    async fn test_continuation_rejections() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(None)?;

        let unknown = backend
            .upload_file_continue(continuation(FileId::new(99), 1, Bytes::from_static(b"x"), 2))
            .await;
        assert!(matches!(unknown, Err(FileVaultError::NotRequested)));

        let file_id = backend
            .upload_file_atomic(atomic("a.txt", Bytes::from_static(b"a"), 3))
            .await?;
        let skipped = backend
            .upload_file_continue(continuation(file_id, 2, Bytes::from_static(b"c"), 3))
            .await;
        assert!(matches!(
            skipped,
            Err(FileVaultError::OutOfOrderChunk {
                expected: 1,
                received: 2
            })
        ));
        let resized = backend
            .upload_file_continue(continuation(file_id, 1, Bytes::from_static(b"b"), 4))
            .await;
        assert!(matches!(
            resized,
            Err(FileVaultError::ChunkCountMismatch {
                declared: 3,
                received: 4
            })
        ));

        let complete = backend
            .upload_file_atomic(atomic("b.txt", Bytes::from_static(b"b"), 1))
            .await?;
        let late = backend
            .upload_file_continue(continuation(complete, 1, Bytes::from_static(b"x"), 1))
            .await;
        assert!(matches!(late, Err(FileVaultError::AlreadyUploaded)));
        Ok(())
    }

    #[tokio::test]
    async fn test_register_blob_file_is_listed() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(None)?;

        let file_id = backend
            .register_file(RegisterFileRequest {
                file_name: "a.txt".to_string(),
                storage_provider: StorageProvider::SecondaryBlob,
                blob_id: Some(BlobId::from("b123")),
                file_type: None,
                requested_at: 1000,
                uploaded_at: Some(1000),
                owner: None,
            })
            .await?;

        let files = backend.list_files().await?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_id, file_id);
        assert_eq!(files[0].storage_provider, StorageProvider::SecondaryBlob);
        assert_eq!(files[0].blob_id, Some(BlobId::from("b123")));
        assert_eq!(files[0].file_status, FileStatus::Uploaded);

        let invalid = backend
            .register_file(RegisterFileRequest {
                file_name: "b.txt".to_string(),
                storage_provider: StorageProvider::SecondaryBlob,
                blob_id: None,
                file_type: None,
                requested_at: 1000,
                uploaded_at: None,
                owner: None,
            })
            .await;
        assert!(matches!(invalid, Err(FileVaultError::InvalidRegistration(_))));
        assert_eq!(backend.list_files().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_absent_file_leaves_catalog_unchanged() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(None)?;
        backend
            .upload_file_atomic(atomic("keep.txt", Bytes::from_static(b"keep"), 1))
            .await?;

        assert_eq!(
            backend.delete_file(FileId::new(42)).await?,
            DeleteFileResult::NotFound
        );
        assert_eq!(
            test_srv.vault(None)?.delete(FileId::new(42)).await?,
            DeleteFileResult::NotFound
        );
        assert_eq!(backend.list_files().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected_before_any_call() -> Result<()> {
        let test_srv = TestService::new().await?;
        let vault = test_srv.vault(None)?;
        let (progress, _) = watch::channel(0);

        let payload = Bytes::from(vec![0u8; MAX_UPLOAD_SIZE + 1024 * 1024]);
        for provider in [StorageProvider::PrimaryChunked, StorageProvider::SecondaryBlob] {
            let result = vault
                .upload(upload_request("huge.bin", payload.clone(), provider), &progress)
                .await;
            assert!(matches!(result, Err(FileVaultError::SizeExceeded { .. })));
        }
        assert!(vault.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_blob_file_round_trip_and_delete() -> Result<()> {
        let test_srv = TestService::new().await?;
        let vault = test_srv.vault(Some("alice"))?;
        let (progress, progress_rx) = watch::channel(0);

        let contents = Bytes::from_static(b"stored in the content store");
        let file_id = vault
            .upload(
                upload_request("blob.txt", contents.clone(), StorageProvider::SecondaryBlob),
                &progress,
            )
            .await?;
        assert_eq!(*progress_rx.borrow(), 100);

        let file = test_srv
            .backend(Some("alice"))?
            .get_file(file_id)
            .await?
            .unwrap();
        let blob_id = file.blob_id.clone().unwrap();
        assert_eq!(file.file_status, FileStatus::Uploaded);
        assert_eq!(file.num_chunks, 0);

        let downloaded = vault.download(file_id).await?;
        assert_eq!(downloaded.contents, contents);
        assert_eq!(downloaded.file_type, "text/plain");

        assert_eq!(vault.delete(file_id).await?, DeleteFileResult::Ok);
        assert!(test_srv.service.content_store.get(&blob_id).await?.is_none());
        assert!(test_srv
            .backend(Some("alice"))?
            .get_file(file_id)
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_marked_file_is_hidden_until_deleted() -> Result<()> {
        let test_srv = TestService::new().await?;
        let vault = test_srv.vault(None)?;
        let backend = test_srv.backend(None)?;
        let (progress, _) = watch::channel(0);

        let file_id = vault
            .upload(
                upload_request("doomed.txt", Bytes::from_static(b"bye"), StorageProvider::SecondaryBlob),
                &progress,
            )
            .await?;
        assert_eq!(backend.mark_for_deletion(file_id).await?, DeleteFileResult::Ok);
        assert_eq!(backend.mark_for_deletion(file_id).await?, DeleteFileResult::Ok);

        assert!(vault.list().await?.is_empty());
        assert!(matches!(
            vault.download(file_id).await,
            Err(FileVaultError::NotFoundFile)
        ));
        assert!(backend
            .get_file(file_id)
            .await?
            .unwrap()
            .deletion_requested_at
            .is_some());

        assert_eq!(vault.delete(file_id).await?, DeleteFileResult::Ok);
        assert!(backend.get_file(file_id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_files_are_private_until_shared() -> Result<()> {
        let test_srv = TestService::new().await?;
        let alice = test_srv.backend(Some("alice"))?;
        let bob = test_srv.backend(Some("bob"))?;

        let file_id = alice
            .upload_file_atomic(atomic("diary.txt", Bytes::from_static(b"secret"), 1))
            .await?;

        assert_eq!(
            bob.download_file(file_id, 0).await?,
            FileDownloadResponse::PermissionError
        );
        assert!(bob.list_files().await?.is_empty());
        assert!(matches!(
            bob.get_file(file_id).await,
            Err(FileVaultError::PermissionError)
        ));
        assert_eq!(
            bob.share_file(file_id, Principal::from("carol")).await?,
            FileSharingResponse::PermissionError
        );

        assert_eq!(
            alice.share_file(file_id, Principal::from("bob")).await?,
            FileSharingResponse::Ok
        );
        assert!(matches!(
            bob.download_file(file_id, 0).await?,
            FileDownloadResponse::FoundFile(_)
        ));
        let listed = bob.list_files().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].shared_with, vec![Principal::from("bob")]);

        assert_eq!(
            alice.share_file(FileId::new(7), Principal::from("bob")).await?,
            FileSharingResponse::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_registration_cannot_be_shared() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(Some("alice"))?;
        let file_id = backend
            .register_file(RegisterFileRequest {
                file_name: "later.txt".to_string(),
                storage_provider: StorageProvider::PrimaryChunked,
                blob_id: None,
                file_type: None,
                requested_at: 1000,
                uploaded_at: None,
                owner: None,
            })
            .await?;

        assert_eq!(
            backend.share_file(file_id, Principal::from("bob")).await?,
            FileSharingResponse::PendingError
        );
        let pending = backend.get_file(file_id).await?.unwrap();
        assert_eq!(pending.file_status, FileStatus::Pending);
        assert!(matches!(
            backend
                .upload_file_continue(continuation(file_id, 1, Bytes::from_static(b"x"), 2))
                .await,
            Err(FileVaultError::NotRequested)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_upload() -> Result<()> {
        let test_srv = TestService::new().await?;
        let backend = test_srv.backend(None)?;

        let partial = backend
            .upload_file_atomic(atomic("partial.bin", Bytes::from_static(b"0"), 3))
            .await?;
        assert_eq!(backend.abort_upload(partial).await?, AbortUploadResult::Ok);
        assert!(backend.get_file(partial).await?.is_none());
        assert!(matches!(
            backend
                .upload_file_continue(continuation(partial, 1, Bytes::from_static(b"1"), 3))
                .await,
            Err(FileVaultError::NotRequested)
        ));

        let complete = backend
            .upload_file_atomic(atomic("complete.bin", Bytes::from_static(b"0"), 1))
            .await?;
        assert_eq!(
            backend.abort_upload(complete).await?,
            AbortUploadResult::AlreadyUploaded
        );
        assert_eq!(
            backend.abort_upload(FileId::new(99)).await?,
            AbortUploadResult::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_chunk_over_body_limit_is_refused() -> Result<()> {
        let test_srv = TestService::with_config(|config| config.max_chunk_bytes = 1024).await?;
        let backend = test_srv.backend(None)?;

        let result = backend
            .upload_file_atomic(atomic("big.bin", Bytes::from(vec![1u8; 2048]), 1))
            .await;
        assert!(matches!(result, Err(FileVaultError::BackendUnavailable(_))));
        assert!(backend.list_files().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_client_chunked_round_trip_reports_progress() -> Result<()> {
        let test_srv = TestService::new().await?;
        let mut config = test_srv.client_config(Some("alice"));
        config.chunk_size = 1024;
        let vault = filevault_client::FileVault::from_config(&config)?;
        let (progress, progress_rx) = watch::channel(0);

        let payload: Bytes = (0..10_000u32).map(|i| (i % 7) as u8).collect();
        let file_id = vault
            .upload(
                upload_request("numbers.bin", payload.clone(), StorageProvider::PrimaryChunked),
                &progress,
            )
            .await?;
        assert_eq!(*progress_rx.borrow(), 100);

        let file = vault.list().await?.into_iter().next().unwrap();
        assert_eq!(file.file_id, file_id);
        assert_eq!(file.num_chunks, 10);
        assert_eq!(vault.download(file_id).await?.contents, payload);
        Ok(())
    }
}
