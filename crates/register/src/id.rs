use crate::Store;
use crate::error::{ErrorKind, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

const GROUPS: usize = 5;
const GROUP_SPAN: u16 = 10_000;
/// Collisions in a 10^20 space are practically impossible; this only bounds a
/// pathological generator.
const MAX_ATTEMPTS: usize = 256;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{4}(?:-[0-9]{4}){4}$").unwrap());

/// Identifier of a cache record, such as `0012-9381-0004-7765-0001`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(String);

impl CacheId {
    pub fn parse(raw: &str) -> Result<Self> {
        if Self::is_valid(raw) {
            Ok(Self(raw.to_string()))
        } else {
            exn::bail!(ErrorKind::MalformedId(raw.to_string()))
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        ID_PATTERN.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CacheId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Result of checking a caller-supplied id string against a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdStatus {
    Exists,
    /// Well-formed, but no record carries it.
    Absent,
    Malformed,
}

/// Generates fresh ids that collide neither with the store nor with anything
/// this allocator has already handed out.
pub struct IdAllocator<R = StdRng> {
    rng: R,
    issued: HashSet<CacheId>,
}

impl IdAllocator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Deterministic sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl Default for IdAllocator<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl<R: Rng> IdAllocator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng, issued: HashSet::new() }
    }

    /// A random, well-formed id. Uniqueness is not checked.
    pub fn generate(&mut self) -> CacheId {
        let groups: Vec<String> =
            (0..GROUPS).map(|_| format!("{:04}", self.rng.gen_range(0..GROUP_SPAN))).collect();
        CacheId(groups.join("-"))
    }

    pub fn allocate(&mut self, store: &Store) -> Result<CacheId> {
        let existing: HashSet<CacheId> = store.ids()?.into_iter().collect();
        for _ in 0..MAX_ATTEMPTS {
            let candidate = self.generate();
            if existing.contains(&candidate) || self.issued.contains(&candidate) {
                tracing::debug!(id = %candidate, "Cache id collision, regenerating");
                continue;
            }
            self.issued.insert(candidate.clone());
            return Ok(candidate);
        }
        exn::bail!(ErrorKind::IdSpaceExhausted)
    }

    /// How many ids this allocator has handed out.
    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}
