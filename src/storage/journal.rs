use crate::error::StorageError;
use crate::storage_traits::{Commit, PersistedLedger, RegistryStore};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Open journal file and the length of its last complete entry
#[derive(Debug)]
struct JournalFile {
    file: File,
    committed_len: u64,
}

/// Append-only file store.
///
/// Each commit is one entry: a little-endian u64 length followed by the
/// bincode-encoded [`Commit`]. A torn entry at the tail (from a crash mid-append)
/// is cut off when the journal is opened.
#[derive(Debug)]
pub struct JournalStore {
    path: PathBuf,
    file: Mutex<JournalFile>,
}

impl JournalStore {
    /// Open or create the journal at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::Journal(format!("Failed to open journal file: {}", e)))?;

        let (commits, committed_len) = Self::read_entries(&file)?;
        let actual_len = file.metadata()?.len();
        if actual_len > committed_len {
            warn!(
                "Truncating torn journal tail of {} bytes in {}",
                actual_len - committed_len,
                path.display()
            );
            file.set_len(committed_len)?;
        }
        debug!(
            "Opened journal {} with {} commits",
            path.display(),
            commits.len()
        );

        Ok(Self {
            path,
            file: Mutex::new(JournalFile {
                file,
                committed_len,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every complete entry, returning the commits and the byte length they span
    fn read_entries(file: &File) -> Result<(Vec<Commit>, u64), StorageError> {
        let file_len = file.metadata()?.len();
        let mut handle = file.try_clone()?;
        handle.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(handle);
        let mut commits = Vec::new();
        let mut offset = 0u64;

        loop {
            // Read the entry length
            let mut len_buf = [0u8; 8];
            match reader.read_exact(&mut len_buf) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(StorageError::from(e)),
            }
            let entry_len = u64::from_le_bytes(len_buf);
            if entry_len > file_len - offset - 8 {
                break;
            }

            // Read the entry data
            let mut entry_data = vec![0u8; entry_len as usize];
            match reader.read_exact(&mut entry_data) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(StorageError::from(e)),
            }

            let commit: Commit = match bincode::deserialize(&entry_data) {
                Ok(commit) => commit,
                Err(e) => {
                    warn!("Stopping journal replay at offset {}: {}", offset, e);
                    break;
                }
            };
            commits.push(commit);
            offset += 8 + entry_len;
        }

        Ok((commits, offset))
    }
}

fn append_entry(file: &mut File, start: u64, entry: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(start))?;
    file.write_all(entry)?;
    file.flush()?;
    file.sync_data()
}

impl RegistryStore for JournalStore {
    fn load(&self) -> Result<PersistedLedger, StorageError> {
        let guard = self
            .file
            .lock()
            .map_err(|e| StorageError::Journal(format!("Failed to acquire lock: {}", e)))?;
        let (commits, _) = Self::read_entries(&guard.file)?;

        let mut ledger = PersistedLedger::default();
        for commit in commits {
            ledger.writes.extend(commit.writes);
            ledger.audit.extend(commit.audit);
        }
        Ok(ledger)
    }

    fn commit(&self, commit: &Commit) -> Result<(), StorageError> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| StorageError::Journal(format!("Failed to acquire lock: {}", e)))?;

        let serialized = bincode::serialize(commit)?;
        let mut entry = Vec::with_capacity(8 + serialized.len());
        entry.extend_from_slice(&(serialized.len() as u64).to_le_bytes());
        entry.extend_from_slice(&serialized);

        let start = guard.committed_len;
        if let Err(e) = append_entry(&mut guard.file, start, &entry) {
            // Drop whatever part of the entry reached the file
            let _ = guard.file.set_len(start);
            return Err(StorageError::Journal(format!("Failed to append commit: {}", e)));
        }

        guard.committed_len = start + entry.len() as u64;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "journal"
    }
}
