//! Storage engine implementation
//!
//! File layout:
//! - `birthdays.db`: header + append-only records
//!
//! Upserts append a record; on open the records are replayed in order, so the
//! last record for a name wins.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::parser::{
    create_header, format_record, parse_header, parse_records, BDAY_MAGIC, HEADER_LEN,
};
use crate::types::{Birthday, Name};

/// Maximum name length in bytes, after normalization
pub const MAX_NAME_LEN: usize = 256;

/// Current file format version
const FORMAT_VERSION: u32 = 1;

/// Data file name inside the store directory
const DATA_FILE: &str = "birthdays.db";

/// BirthdayStore is the main store handle
pub struct BirthdayStore {
    /// Path to the store directory
    path: PathBuf,

    inner: RwLock<Inner>,
}

struct Inner {
    /// Data file handle
    file: File,

    /// In-memory index: normalized name -> birthday
    index: HashMap<Name, Birthday>,

    /// Records in the data file, superseded ones included
    record_count: u32,

    /// Is the store closed?
    closed: bool,
}

impl BirthdayStore {
    /// Open or create a store at the given path
    ///
    /// # Arguments
    /// * `path` - Directory path for the store files
    ///
    /// # Returns
    /// * `Result<BirthdayStore>` - Store handle
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let data_path = path.join(DATA_FILE);
        let inner = if data_path.exists() {
            Self::open_existing(&data_path)?
        } else {
            Self::create_new(&data_path)?
        };

        Ok(BirthdayStore {
            path: path.to_path_buf(),
            inner: RwLock::new(inner),
        })
    }

    fn open_existing(data_path: &Path) -> Result<Inner> {
        let mut file = OpenOptions::new().read(true).write(true).open(data_path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let header = parse_header(&buf)?;
        if header.version != FORMAT_VERSION {
            return Err(Error::Parse(format!(
                "Unsupported store version: {}",
                header.version
            )));
        }

        let body = &buf[HEADER_LEN..];
        let (records, consumed) = parse_records(body)?;
        let tail = &body[consumed..];

        if !tail.is_empty() {
            if tail.contains(&b'\n') {
                return Err(Error::Parse(format!(
                    "Corrupt record at offset {}",
                    HEADER_LEN + consumed
                )));
            }

            // Unterminated last record: an append that never completed
            warn!(
                path = %data_path.display(),
                bytes = tail.len(),
                "discarding torn record at end of store"
            );
            file.set_len((HEADER_LEN + consumed) as u64)?;
        }

        let record_count = u32::try_from(records.len())
            .map_err(|_| Error::Parse(format!("Too many records: {}", records.len())))?;
        let mut index = HashMap::with_capacity(records.len());
        for (name, birthday) in records {
            index.insert(name, birthday);
        }

        file.seek(SeekFrom::End(0))?;

        Ok(Inner {
            file,
            index,
            record_count,
            closed: false,
        })
    }

    fn create_new(data_path: &Path) -> Result<Inner> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(data_path)?;

        file.write_all(&create_header(FORMAT_VERSION, 0))?;
        file.sync_all()?;

        Ok(Inner {
            file,
            index: HashMap::new(),
            record_count: 0,
            closed: false,
        })
    }

    /// Insert or replace the birthday stored for a name
    ///
    /// Writing the birthday a name already has is a no-op.
    ///
    /// # Arguments
    /// * `name` - Name, normalized before storing
    /// * `birthday` - Date to store
    pub fn upsert(&self, name: &Name, birthday: Birthday) -> Result<()> {
        let name = name.normalize();
        validate_name(&name)?;

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }

        if inner.index.get(&name) == Some(&birthday) {
            return Ok(());
        }

        let record_count = inner.record_count.checked_add(1).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "record count would overflow the store header",
            ))
        })?;

        let record = format_record(&name, birthday);
        append_record(&mut inner.file, &record)?;

        inner.record_count = record_count;
        inner.index.insert(name, birthday);

        Ok(())
    }

    /// Upsert a set of birthdays, stopping at the first failure
    ///
    /// # Returns
    /// * `Err(Error::Seed)` - carries the name that failed
    pub fn upsert_all<I>(&self, birthdays: I) -> Result<()>
    where
        I: IntoIterator<Item = (Name, Birthday)>,
    {
        for (name, birthday) in birthdays {
            if let Err(e) = self.upsert(&name, birthday) {
                return Err(Error::Seed {
                    name,
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Look up the birthday stored for a name
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - nothing stored under the normalized name
    pub fn lookup(&self, name: &Name) -> Result<Birthday> {
        let name = name.normalize();

        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }

        let birthday = *inner.index.get(&name).ok_or(Error::NotFound)?;
        info!(name = %name, date = %birthday, "loaded birthday from store");
        Ok(birthday)
    }

    /// Get the number of names in the store
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }

    /// Directory the store lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the store and fsync all changes
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }

        // Update header with current record count
        let record_count = inner.record_count;
        inner.file.seek(SeekFrom::Start(BDAY_MAGIC.len() as u64 + 4))?;
        inner.file.write_all(&record_count.to_le_bytes())?;
        inner.file.sync_all()?;

        inner.closed = true;

        Ok(())
    }
}

impl Drop for BirthdayStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Append-only sink for records
trait RecordLog: Write + Seek {
    /// Cut the log back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl RecordLog for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append a record at the end of the log
///
/// A failed write is cut back off, so the next record never lands behind a
/// partial one.
fn append_record<L: RecordLog>(log: &mut L, record: &[u8]) -> Result<()> {
    let end = log.seek(SeekFrom::End(0))?;

    if let Err(e) = log.write_all(record) {
        if let Err(undo) = log.truncate(end) {
            warn!(offset = end, error = %undo, "failed to discard partial record");
        }
        return Err(e.into());
    }

    Ok(())
}

fn validate_name(name: &Name) -> Result<()> {
    let raw = name.as_str();
    if raw.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong(raw.len()));
    }
    if raw.is_empty() || raw.contains(&[',', '\n', '\r'][..]) {
        return Err(Error::InvalidName(raw.to_string()));
    }
    Ok(())
}
