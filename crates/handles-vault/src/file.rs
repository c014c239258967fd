use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use handles_types::Hash;
use tracing::{debug, info, warn};

use crate::error::{VaultError, VaultResult};
use crate::traits::HashStore;

/// Journal record size: 1 byte op + 32 bytes key + 4 bytes CRC.
///
/// On-disk format of every record:
/// ```text
/// [1 byte: op (1 = insert, 0 = remove)]
/// [32 bytes: key]
/// [4 bytes: CRC32 of op + key (little-endian u32)]
/// ```
const RECORD_SIZE: usize = 37;
const PAYLOAD_SIZE: usize = 33;

const OP_REMOVE: u8 = 0;
const OP_INSERT: u8 = 1;

struct Journal {
    file: File,
    /// Number of complete records in the file.
    records: u64,
}

impl Journal {
    fn valid_len(&self) -> u64 {
        self.records * RECORD_SIZE as u64
    }

    fn append(&mut self, record: &[u8; RECORD_SIZE]) -> io::Result<()> {
        self.file.write_all(record)?;
        self.records += 1;
        Ok(())
    }

    /// Cut the file back to its last complete record.
    fn discard_partial(&mut self) -> io::Result<()> {
        let valid = self.valid_len();
        if self.file.metadata()?.len() > valid {
            self.file.set_len(valid)?;
        }
        Ok(())
    }
}

/// Durable hash store: ordered in-memory index plus an append-only journal.
///
/// Every state-changing insert or remove is appended to
/// `<root>/<name>.vault` before the index changes. Opening a store replays
/// the journal front-to-back. A torn final record (crash mid-write) is
/// truncated away; any other damaged record is a construction failure,
/// since skipping it could resurrect a removed key.
pub struct FileHashStore {
    path: PathBuf,
    index: RwLock<BTreeSet<Hash>>,
    journal: Mutex<Option<Journal>>,
}

impl FileHashStore {
    /// Journal path for a named vault under `root`.
    pub fn path_for(root: &Path, name: &str) -> PathBuf {
        root.join(format!("{name}.vault"))
    }

    /// Open (or create) the journal for `name` under `root`.
    pub fn open(root: &Path, name: &str) -> VaultResult<Self> {
        fs::create_dir_all(root)?;
        let path = Self::path_for(root, name);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let (index, valid_len, records) = replay(&path, &data)?;

        if valid_len < data.len() as u64 {
            warn!(
                path = %path.display(),
                valid_len,
                file_len = data.len(),
                "torn journal tail; truncating"
            );
            file.set_len(valid_len)?;
        }

        info!(path = %path.display(), keys = index.len(), records, "vault journal opened");

        Ok(Self {
            path,
            index: RwLock::new(index),
            journal: Mutex::new(Some(Journal {
                file,
                records,
            })),
        })
    }

    /// Replace any journal for `name` under `root` with one holding exactly
    /// `keys`, then open it.
    pub fn create_from_keys(root: &Path, name: &str, keys: &[Hash]) -> VaultResult<Self> {
        fs::create_dir_all(root)?;
        let path = Self::path_for(root, name);
        write_compacted(&path, keys)?;
        Self::open(root, name)
    }

    /// Number of records in the journal, including superseded ones.
    pub fn journal_records(&self) -> u64 {
        self.lock_journal()
            .as_ref()
            .map(|journal| journal.records)
            .unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_journal(&self) -> MutexGuard<'_, Option<Journal>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed(&self) -> VaultError {
        VaultError::Closed(self.path.display().to_string())
    }

    /// Journal `op` on `key` and apply it to the index if it changes the set.
    fn apply(&self, op: u8, key: Hash) -> VaultResult<bool> {
        let mut guard = self.lock_journal();
        let Some(journal) = guard.as_mut() else {
            return Err(self.closed());
        };

        let present = self.exists(&key);
        let changes = match op {
            OP_INSERT => !present,
            _ => present,
        };
        if !changes {
            return Ok(false);
        }

        if let Err(err) = journal.append(&encode_record(op, &key)) {
            // A torn record must not sit in front of the next append.
            if let Err(cut) = journal.discard_partial() {
                warn!(path = %self.path.display(), error = %cut, "cannot trim journal; closing it");
                guard.take();
            }
            return Err(err.into());
        }

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if op == OP_INSERT {
            index.insert(key);
        } else {
            index.remove(&key);
        }
        Ok(true)
    }
}

impl HashStore for FileHashStore {
    fn insert(&self, key: Hash) -> VaultResult<bool> {
        self.apply(OP_INSERT, key)
    }

    fn remove(&self, key: &Hash) -> VaultResult<bool> {
        self.apply(OP_REMOVE, *key)
    }

    fn exists(&self, key: &Hash) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn len(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn keys(&self) -> Vec<Hash> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn is_open(&self) -> bool {
        self.lock_journal().is_some()
    }

    /// Rewrite the journal as one insert record per present key.
    ///
    /// The new journal is written to a temporary file in the same directory
    /// and renamed over the old one, so a crash leaves either version intact.
    fn compact(&self) -> VaultResult<()> {
        let mut guard = self.lock_journal();
        let Some(journal) = guard.as_mut() else {
            return Err(self.closed());
        };
        let keys = self.keys();
        let before = journal.records;
        if before == keys.len() as u64 {
            return Ok(());
        }
        write_compacted(&self.path, &keys)?;
        *journal = Journal {
            file: OpenOptions::new().append(true).open(&self.path)?,
            records: keys.len() as u64,
        };
        debug!(path = %self.path.display(), before, after = keys.len(), "vault journal compacted");
        Ok(())
    }

    fn close(&self) -> VaultResult<()> {
        let Some(journal) = self.lock_journal().take() else {
            return Err(self.closed());
        };
        journal.file.sync_all()?;
        debug!(path = %self.path.display(), "vault journal closed");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

impl std::fmt::Debug for FileHashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHashStore")
            .field("path", &self.path)
            .field("key_count", &self.len())
            .finish()
    }
}

fn encode_record(op: u8, key: &Hash) -> [u8; RECORD_SIZE] {
    let mut record = [0u8; RECORD_SIZE];
    record[0] = op;
    record[1..PAYLOAD_SIZE].copy_from_slice(key.as_bytes());
    let crc = crc32fast::hash(&record[..PAYLOAD_SIZE]);
    record[PAYLOAD_SIZE..].copy_from_slice(&crc.to_le_bytes());
    record
}

/// Rebuild the index from journal bytes.
///
/// Returns the index, the length of the valid prefix, and its record count.
fn replay(path: &Path, data: &[u8]) -> VaultResult<(BTreeSet<Hash>, u64, u64)> {
    let mut index = BTreeSet::new();
    let mut records = 0u64;
    let mut offset = 0usize;

    while offset + RECORD_SIZE <= data.len() {
        let record = &data[offset..offset + RECORD_SIZE];
        let is_last = offset + RECORD_SIZE == data.len();

        let mut crc = [0u8; 4];
        crc.copy_from_slice(&record[PAYLOAD_SIZE..]);
        let expected = u32::from_le_bytes(crc);
        let actual = crc32fast::hash(&record[..PAYLOAD_SIZE]);

        let reason = if actual != expected {
            Some(format!("CRC mismatch: expected {expected:#010x}, got {actual:#010x}"))
        } else if record[0] != OP_INSERT && record[0] != OP_REMOVE {
            Some(format!("unknown op {:#04x}", record[0]))
        } else {
            None
        };

        if let Some(reason) = reason {
            if is_last {
                warn!(path = %path.display(), offset, %reason, "damaged final journal record");
                return Ok((index, offset as u64, records));
            }
            return Err(VaultError::Corrupt {
                path: path.to_path_buf(),
                offset: offset as u64,
                reason,
            });
        }

        let mut raw = [0u8; 32];
        raw.copy_from_slice(&record[1..PAYLOAD_SIZE]);
        let key = Hash::from_hash(raw);
        if record[0] == OP_INSERT {
            index.insert(key);
        } else {
            index.remove(&key);
        }

        records += 1;
        offset += RECORD_SIZE;
    }

    Ok((index, offset as u64, records))
}

fn write_compacted(path: &Path, keys: &[Hash]) -> VaultResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        for key in keys {
            writer.write_all(&encode_record(OP_INSERT, key))?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
