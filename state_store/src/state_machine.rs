use anyhow::{anyhow, Result};
use data_model::{ChunkIndex, FileId, FileRecord, StateMachineMetadata};
use rocksdb::{ColumnFamily, Transaction, TransactionDB};
use strum::AsRefStr;
use tracing::debug;

use super::serializer::{JsonEncode, JsonEncoder};

pub const SM_META_KEY: &[u8] = b"sm_meta";

#[derive(AsRefStr, strum::Display, strum::EnumIter)]
pub enum FileVaultColumns {
    StateMachineMetadata, //  "sm_meta" -> StateMachineMetadata
    Files,                //  FileId -> FileRecord
    Chunks,               //  FileId_ChunkIndex -> chunk bytes
}

impl FileVaultColumns {
    pub fn cf<'a>(&self, db: &'a TransactionDB) -> Result<&'a ColumnFamily> {
        db.cf_handle(self.as_ref())
            .ok_or_else(|| anyhow!("failed to get column family handle for {}", self.as_ref()))
    }
}

pub(crate) type Txn<'a> = Transaction<'a, TransactionDB>;

/// Hands out the next file id. The metadata row is locked for the rest of
/// the transaction so concurrent allocations serialize.
pub(crate) fn allocate_file_id(db: &TransactionDB, txn: &Txn) -> Result<FileId> {
    let cf = FileVaultColumns::StateMachineMetadata.cf(db)?;
    let mut sm_meta = match txn.get_for_update_cf(cf, SM_META_KEY, true)? {
        Some(bytes) => JsonEncoder::decode::<StateMachineMetadata>(&bytes)?,
        None => StateMachineMetadata { next_file_id: 0 },
    };
    let file_id = FileId::new(sm_meta.next_file_id);
    sm_meta.next_file_id += 1;
    txn.put_cf(cf, SM_META_KEY, JsonEncoder::encode(&sm_meta)?)?;
    Ok(file_id)
}

pub(crate) fn get_file_for_update(
    db: &TransactionDB,
    txn: &Txn,
    file_id: FileId,
) -> Result<Option<FileRecord>> {
    let record = txn.get_for_update_cf(FileVaultColumns::Files.cf(db)?, file_id.key(), true)?;
    record
        .map(|bytes| JsonEncoder::decode::<FileRecord>(&bytes))
        .transpose()
}

pub(crate) fn put_file(db: &TransactionDB, txn: &Txn, record: &FileRecord) -> Result<()> {
    let serialized = JsonEncoder::encode(record)?;
    txn.put_cf(FileVaultColumns::Files.cf(db)?, record.key(), serialized)?;
    Ok(())
}

pub(crate) fn put_chunk(
    db: &TransactionDB,
    txn: &Txn,
    file_id: FileId,
    chunk_index: ChunkIndex,
    content: &[u8],
) -> Result<()> {
    debug!(
        file_id = file_id.get(),
        chunk_index,
        size = content.len(),
        "storing chunk"
    );
    txn.put_cf(
        FileVaultColumns::Chunks.cf(db)?,
        file_id.chunk_key(chunk_index),
        content,
    )?;
    Ok(())
}

/// Removes the record and every chunk stored for it. Chunks are accepted
/// strictly in order, so only `0..chunks_received` can exist.
pub(crate) fn delete_file(db: &TransactionDB, txn: &Txn, record: &FileRecord) -> Result<()> {
    let chunks_cf = FileVaultColumns::Chunks.cf(db)?;
    for chunk_index in 0..record.chunks_received {
        txn.delete_cf(chunks_cf, record.file_id.chunk_key(chunk_index))?;
    }
    txn.delete_cf(FileVaultColumns::Files.cf(db)?, record.key())?;
    Ok(())
}
