use crate::error::{ErrorKind, Result};
use crate::record::{Field, Fields};
use crate::{CacheId, CacheRecord, IdStatus, IntegrityCode};
use exn::ResultExt;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const RECORD_EXTENSION: &str = "ini";

/// A record read from disk, along with whatever was wrong with it.
#[derive(Clone, Debug)]
pub struct Loaded {
    pub record: CacheRecord,
    pub codes: Vec<IntegrityCode>,
}

impl Loaded {
    pub fn is_usable(&self) -> bool {
        !self.codes.iter().any(|code| code.is_fatal())
    }
}

/// Directory of record files, one `<id>.ini` per item.
#[derive(Clone, Debug)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Opens an existing store directory. It is not created here.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            exn::bail!(ErrorKind::StoreMissing(dir));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, id: &CacheId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Every id with a record file. Files that aren't named like a record
    /// are ignored.
    pub fn ids(&self) -> Result<Vec<CacheId>> {
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.dir).or_raise(|| ErrorKind::Io(self.dir.clone()))?;
        for entry in entries {
            let path = entry.or_raise(|| ErrorKind::Io(self.dir.clone()))?.path();
            if path.extension().is_none_or(|ext| ext != RECORD_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()).map(CacheId::parse) {
                Some(Ok(id)) => ids.push(id),
                _ => tracing::debug!(path = %path.display(), "Ignoring file with non-id name in store"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn contains(&self, id: &CacheId) -> bool {
        self.record_path(id).is_file()
    }

    /// Checks a caller-supplied id without trusting its shape.
    pub fn id_status(&self, raw: &str) -> Result<IdStatus> {
        let Ok(id) = CacheId::parse(raw) else {
            return Ok(IdStatus::Malformed);
        };
        let path = self.record_path(&id);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(IdStatus::Exists),
            Ok(_) => Ok(IdStatus::Absent),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(IdStatus::Absent),
            Err(err) => Err(exn::Exn::from(err).raise(ErrorKind::Io(path))),
        }
    }

    /// The record whose original path equals `path`, ignoring case.
    ///
    /// Record files that can't be read are skipped.
    pub fn find_by_path(&self, path: &Path) -> Result<Option<CacheId>> {
        let wanted = path.to_string_lossy().to_lowercase();
        for id in self.ids()? {
            let record_path = self.record_path(&id);
            match read_original_path(&record_path) {
                Ok(Some(original)) if original.to_lowercase() == wanted => return Ok(Some(id)),
                Ok(_) => {},
                Err(err) => {
                    tracing::debug!(path = %record_path.display(), error = %err, "Skipping unreadable record");
                },
            }
        }
        Ok(None)
    }

    /// Reads and parses a record. Only a missing or unreadable file is an
    /// error; content problems are reported through [`Loaded::codes`].
    pub fn read(&self, id: &CacheId) -> Result<Loaded> {
        let path = self.record_path(id);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::RecordNotFound(id.clone()))
            },
            Err(err) => return Err(exn::Exn::from(err).raise(ErrorKind::Io(path))),
        };
        let fields = Fields::read(BufReader::new(file)).or_raise(|| ErrorKind::Io(path.clone()))?;
        let (record, codes) = fields.into_record(id);
        if !codes.is_empty() {
            tracing::debug!(id = %id, ?codes, "Record read with integrity findings");
        }
        Ok(Loaded { record, codes })
    }

    /// Truncates and rewrites the record file, then optionally reads it back
    /// and compares every field.
    pub fn write(&self, record: &CacheRecord, verify: bool) -> Result<Vec<IntegrityCode>> {
        let path = self.record_path(&record.id);
        write_synced(&path, record.encode().as_bytes()).or_raise(|| ErrorKind::Write(path.clone()))?;
        tracing::trace!(id = %record.id, status = ?record.status, "Record written");
        if !verify {
            return Ok(Vec::new());
        }
        let fields = match fs::File::open(&path).and_then(|file| Fields::read(BufReader::new(file))) {
            Ok(fields) => fields,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Could not re-read record for verification");
                return Ok(vec![IntegrityCode::Unverifiable]);
            },
        };
        let codes = fields.verify(record);
        if !codes.is_empty() {
            tracing::warn!(id = %record.id, ?codes, "Record verification found differences");
        }
        Ok(codes)
    }

    pub fn delete(&self, id: &CacheId) -> Result<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::RecordNotFound(id.clone()))
            },
            Err(err) => Err(exn::Exn::from(err).raise(ErrorKind::Io(path))),
        }
    }
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    writer.write_all(contents)?;
    writer.flush()?;
    writer.into_inner().map_err(|err| err.into_error())?.sync_all()
}

/// Reads only as far as the `Path=` line.
fn read_original_path(path: &Path) -> io::Result<Option<String>> {
    let reader = BufReader::new(fs::File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if let Some((Field::Path, value)) = Field::split(line) {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}
