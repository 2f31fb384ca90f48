/// Side channel for transfer progress.
///
/// Called once before any entry is processed and then after every entry,
/// with the total number of entries (directories plus files) and how many
/// have been handled so far.
pub trait Progress {
    fn report(&mut self, total: u64, processed: u64);
}
impl<F: FnMut(u64, u64)> Progress for F {
    fn report(&mut self, total: u64, processed: u64) {
        self(total, processed)
    }
}
