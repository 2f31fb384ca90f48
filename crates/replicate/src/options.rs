/// Whether the source survives a transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// Source is left in place.
    #[default]
    Copy,
    /// Source is removed once everything has been replicated.
    Move,
}

/// Knobs for a single [`transfer`](crate::transfer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferOptions {
    pub mode: TransferMode,
    /// Apply the hidden attribute to the destination root when done.
    pub hide_destination: bool,
    pub replicate_attributes: bool,
    pub replicate_access_control: bool,
    /// For moves, try a plain `rename` before walking the tree. Falls back to
    /// copy-then-delete when the rename fails (e.g. across devices).
    pub rename_when_possible: bool,
}
impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            mode: TransferMode::Copy,
            hide_destination: false,
            replicate_attributes: true,
            replicate_access_control: true,
            rename_when_possible: true,
        }
    }
}
impl TransferOptions {
    pub fn copy() -> Self {
        Self::default()
    }

    pub fn relocate() -> Self {
        Self { mode: TransferMode::Move, ..Self::default() }
    }

    #[must_use]
    pub fn hidden(mut self, hide: bool) -> Self {
        self.hide_destination = hide;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, replicate: bool) -> Self {
        self.replicate_attributes = replicate;
        self
    }

    #[must_use]
    pub fn with_access_control(mut self, replicate: bool) -> Self {
        self.replicate_access_control = replicate;
        self
    }

    #[must_use]
    pub fn with_rename(mut self, rename: bool) -> Self {
        self.rename_when_possible = rename;
        self
    }
}
