use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use data_model::{FileId, Principal, StorageProvider, DEFAULT_FILE_TYPE};
use filevault_client::{config::ClientConfig, coordinator::UploadRequest, FileVault, FileVaultError};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about = "FileVault client")]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "path to the client config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a local file
    Upload {
        path: PathBuf,
        #[arg(long, help = "primary-chunked or secondary-blob")]
        provider: Option<StorageProvider>,
        #[arg(long)]
        file_type: Option<String>,
        #[arg(long, help = "name recorded in the catalog, defaults to the file name")]
        name: Option<String>,
    },
    /// List the files visible to the configured principal
    List,
    /// Download a file
    Download {
        file_id: FileId,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete a file and its bytes
    Delete { file_id: FileId },
    /// Abort an unfinished chunked upload
    Abort { file_id: FileId },
    /// Grant another principal read access
    Share { file_id: FileId, principal: String },
}

/// Reads an upload from disk, refusing files over `limit` before any bytes
/// are loaded.
async fn read_upload(path: &Path, limit: usize) -> Result<Bytes> {
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();
    if size > limit as u64 {
        return Err(FileVaultError::SizeExceeded {
            size: usize::try_from(size).unwrap_or(usize::MAX),
            limit,
        }
        .into());
    }
    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Bytes::from(contents))
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    });
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref())?;
    let vault = FileVault::from_config(&config)?;

    match cli.command {
        Command::Upload {
            path,
            provider,
            file_type,
            name,
        } => {
            let contents = read_upload(&path, config.max_upload_size).await?;
            let file_name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .context("path has no file name")?,
            };
            let (progress, mut progress_rx) = watch::channel(0u8);
            let reporter = tokio::spawn(async move {
                while progress_rx.changed().await.is_ok() {
                    info!(percent = *progress_rx.borrow_and_update(), "upload progress");
                }
            });
            let file_id = vault
                .upload(
                    UploadRequest {
                        file_name,
                        file_type: file_type.unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
                        contents,
                        storage_provider: provider.unwrap_or(config.default_provider),
                    },
                    &progress,
                )
                .await?;
            drop(progress);
            let _ = reporter.await;
            println!("{}", file_id);
        }
        Command::List => {
            for file in vault.list().await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    file.file_id,
                    file.file_status,
                    file.storage_provider,
                    file.file_type,
                    file.file_name
                );
            }
        }
        Command::Download { file_id, out } => {
            let file = vault.download(file_id).await?;
            // Catalog names are untrusted, keep only the last component.
            let out = out.unwrap_or_else(|| {
                Path::new(&file.file_name)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(format!("file-{}", file_id)))
            });
            tokio::fs::write(&out, &file.contents)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            info!(
                path = %out.display(),
                size = file.contents.len(),
                file_type = %file.file_type,
                "downloaded file"
            );
        }
        Command::Delete { file_id } => {
            println!("{:?}", vault.delete(file_id).await?);
        }
        Command::Abort { file_id } => {
            println!("{:?}", vault.abort(file_id).await?);
        }
        Command::Share { file_id, principal } => {
            println!("{:?}", vault.share(file_id, Principal::new(principal)).await?);
        }
    }
    Ok(())
}
