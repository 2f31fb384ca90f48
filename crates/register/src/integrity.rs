use derive_more::Display;

/// Field-level findings from reading or verifying a record file.
///
/// Only [fatal](IntegrityCode::is_fatal) codes make a register unusable; the
/// rest are kept as diagnostics.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum IntegrityCode {
    #[display("record file is missing")]
    FileMissing,
    #[display("record file is empty")]
    FileEmpty,
    #[display("record file could not be read")]
    Unreadable,
    #[display("record file could not be written")]
    Unwritable,
    /// Written, but re-reading for verification failed.
    #[display("record file could not be re-read for verification")]
    Unverifiable,

    #[display("record has no original path")]
    PathMissing,
    #[display("record has no id")]
    IdMissing,
    #[display("record id is malformed")]
    IdMalformed,
    #[display("record has no cache disk path")]
    CacheDiskPathMissing,
    #[display("record has no backup path")]
    BackupPathMissing,
    #[display("record has no type, reconstructed from backup path")]
    ModeMissing,
    #[display("record has no status, assumed not cached")]
    StatusMissing,

    #[display("record type is invalid, reconstructed from backup path")]
    ModeInvalid,
    #[display("record status is invalid")]
    StatusInvalid,

    #[display("stored original path differs")]
    PathMismatch,
    #[display("stored id differs")]
    IdMismatch,
    #[display("stored cache disk path differs")]
    CacheDiskPathMismatch,
    #[display("stored backup path differs")]
    BackupPathMismatch,
    #[display("stored type differs")]
    ModeMismatch,
    #[display("stored status differs")]
    StatusMismatch,
}

impl IntegrityCode {
    /// Whether the record can't be trusted at all.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::FileMissing
                | Self::FileEmpty
                | Self::Unreadable
                | Self::Unwritable
                | Self::PathMissing
                | Self::IdMissing
                | Self::IdMalformed
                | Self::CacheDiskPathMissing
        )
    }
}
