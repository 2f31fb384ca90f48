use crate::{CacheId, IntegrityCode};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

/// How an item is cached.
///
/// The integer encoding is that of existing record files and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheMode {
    /// Blocks every operation.
    #[default]
    Unknown,
    /// A backup copy is kept next to the original.
    Copy,
    /// Relocated without a backup.
    Move,
}

impl CacheMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Copy => 1,
            Self::Move => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Copy),
            2 => Some(Self::Move),
            _ => None,
        }
    }

    /// Records written before `Type` existed are recognised by whether they
    /// had a backup.
    fn infer(backup_path: Option<&Path>) -> Self {
        if backup_path.is_some() { Self::Copy } else { Self::Move }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    #[default]
    NotCached,
    Cached,
    FailToCache,
    FailToRestore,
    FailToRevert,
    Unknown,
}

impl CacheStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::NotCached => 0,
            Self::Cached => 1,
            Self::FailToCache => 2,
            Self::FailToRestore => 3,
            Self::FailToRevert => 4,
            Self::Unknown => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NotCached),
            1 => Some(Self::Cached),
            2 => Some(Self::FailToCache),
            3 => Some(Self::FailToRestore),
            4 => Some(Self::FailToRevert),
            5 => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRecord {
    pub id: CacheId,
    pub original_path: PathBuf,
    pub cache_disk_path: PathBuf,
    /// Only meaningful in [`CacheMode::Copy`].
    pub backup_path: Option<PathBuf>,
    pub mode: CacheMode,
    pub status: CacheStatus,
}

impl CacheRecord {
    pub fn new(id: CacheId, original_path: PathBuf, cache_disk_path: PathBuf, backup_path: Option<PathBuf>) -> Self {
        let mode = CacheMode::infer(backup_path.as_deref());
        Self { id, original_path, cache_disk_path, backup_path, mode, status: CacheStatus::NotCached }
    }

    /// Stand-in for a record that couldn't be read; unusable by construction.
    pub(crate) fn placeholder(id: CacheId) -> Self {
        Self {
            id,
            original_path: PathBuf::new(),
            cache_disk_path: PathBuf::new(),
            backup_path: None,
            mode: CacheMode::Unknown,
            status: CacheStatus::Unknown,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        for field in Field::ALL {
            out.push_str(field.prefix());
            out.push_str(&self.value(field));
            out.push('\n');
        }
        out
    }

    fn value(&self, field: Field) -> String {
        match field {
            Field::Path => self.original_path.to_string_lossy().into_owned(),
            Field::Id => self.id.to_string(),
            Field::CacheDiskPath => self.cache_disk_path.to_string_lossy().into_owned(),
            Field::BackupPath => {
                self.backup_path.as_deref().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
            },
            Field::Type => self.mode.code().to_string(),
            Field::Status => self.status.code().to_string(),
        }
    }
}

/// Record file keys, in the order they are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Field {
    Path,
    Id,
    CacheDiskPath,
    BackupPath,
    Type,
    Status,
}

impl Field {
    pub(crate) const ALL: [Field; 6] =
        [Field::Path, Field::Id, Field::CacheDiskPath, Field::BackupPath, Field::Type, Field::Status];

    pub(crate) fn prefix(self) -> &'static str {
        match self {
            Self::Path => "Path=",
            Self::Id => "Id=",
            Self::CacheDiskPath => "CacheDiskPath=",
            Self::BackupPath => "BackupPath=",
            Self::Type => "Type=",
            Self::Status => "Status=",
        }
    }

    fn missing(self) -> IntegrityCode {
        match self {
            Self::Path => IntegrityCode::PathMissing,
            Self::Id => IntegrityCode::IdMissing,
            Self::CacheDiskPath => IntegrityCode::CacheDiskPathMissing,
            Self::BackupPath => IntegrityCode::BackupPathMissing,
            Self::Type => IntegrityCode::ModeMissing,
            Self::Status => IntegrityCode::StatusMissing,
        }
    }

    fn mismatch(self) -> IntegrityCode {
        match self {
            Self::Path => IntegrityCode::PathMismatch,
            Self::Id => IntegrityCode::IdMismatch,
            Self::CacheDiskPath => IntegrityCode::CacheDiskPathMismatch,
            Self::BackupPath => IntegrityCode::BackupPathMismatch,
            Self::Type => IntegrityCode::ModeMismatch,
            Self::Status => IntegrityCode::StatusMismatch,
        }
    }

    /// Splits a record line into its field and value. Unknown keys are
    /// ignored.
    pub(crate) fn split(line: &str) -> Option<(Self, &str)> {
        Self::ALL.into_iter().find_map(|field| line.strip_prefix(field.prefix()).map(|value| (field, value)))
    }
}

/// Raw field values as read from a record file. The last occurrence of a
/// repeated key wins.
#[derive(Debug, Default)]
pub(crate) struct Fields {
    values: [Option<String>; 6],
    lines: usize,
}

impl Fields {
    pub(crate) fn read(reader: impl BufRead) -> io::Result<Self> {
        let mut fields = Self::default();
        for line in reader.lines() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.trim().is_empty() {
                continue;
            }
            fields.lines += 1;
            if let Some((field, value)) = Field::split(line) {
                fields.values[field as usize] = Some(value.to_string());
            }
        }
        Ok(fields)
    }

    fn get(&self, field: Field) -> Option<&str> {
        self.values[field as usize].as_deref()
    }

    /// A present but empty value counts as missing.
    fn non_empty(&self, field: Field) -> Option<&str> {
        self.get(field).filter(|value| !value.is_empty())
    }

    /// Builds the record stored under `file_id`. Problems are reported as
    /// codes; the returned record is always usable as a value, but must not
    /// be acted on when any code is fatal.
    pub(crate) fn into_record(self, file_id: &CacheId) -> (CacheRecord, Vec<IntegrityCode>) {
        if self.lines == 0 {
            return (CacheRecord::placeholder(file_id.clone()), vec![IntegrityCode::FileEmpty]);
        }
        let mut codes = Vec::new();
        let mut require = |field: Field| {
            let value = self.non_empty(field).map(PathBuf::from);
            if value.is_none() {
                codes.push(field.missing());
            }
            value.unwrap_or_default()
        };
        let original_path = require(Field::Path);
        let cache_disk_path = require(Field::CacheDiskPath);

        match self.non_empty(Field::Id) {
            None => codes.push(IntegrityCode::IdMissing),
            Some(raw) if !CacheId::is_valid(raw) => codes.push(IntegrityCode::IdMalformed),
            Some(raw) if raw != file_id.as_str() => codes.push(IntegrityCode::IdMismatch),
            Some(_) => {},
        }

        let backup_path = self.non_empty(Field::BackupPath).map(PathBuf::from);
        let mode = match self.get(Field::Type) {
            None => {
                codes.push(IntegrityCode::ModeMissing);
                CacheMode::infer(backup_path.as_deref())
            },
            Some(raw) => match raw.trim().parse().ok().and_then(CacheMode::from_code) {
                Some(mode) => mode,
                None => {
                    codes.push(IntegrityCode::ModeInvalid);
                    CacheMode::infer(backup_path.as_deref())
                },
            },
        };
        if mode == CacheMode::Copy && backup_path.is_none() {
            codes.push(IntegrityCode::BackupPathMissing);
        }
        let status = match self.get(Field::Status) {
            None => {
                codes.push(IntegrityCode::StatusMissing);
                CacheStatus::NotCached
            },
            Some(raw) => raw.trim().parse().ok().and_then(CacheStatus::from_code).unwrap_or_else(|| {
                codes.push(IntegrityCode::StatusInvalid);
                CacheStatus::Unknown
            }),
        };

        let record = CacheRecord { id: file_id.clone(), original_path, cache_disk_path, backup_path, mode, status };
        (record, codes)
    }

    /// Compares what was read back against what was meant to be written.
    pub(crate) fn verify(&self, intended: &CacheRecord) -> Vec<IntegrityCode> {
        if self.lines == 0 {
            return vec![IntegrityCode::FileEmpty];
        }
        let mut codes = Vec::new();
        for field in Field::ALL {
            let expected = intended.value(field);
            match self.get(field) {
                None if field == Field::BackupPath && intended.mode != CacheMode::Copy => {},
                None => codes.push(field.missing()),
                Some(actual) if actual != expected => codes.push(field.mismatch()),
                Some(_) => {},
            }
        }
        codes
    }
}
