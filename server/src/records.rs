use std::{
    cmp::Reverse,
    collections::BTreeMap,
    env, fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use minefield_common::models::{Level, Mode, RecordEntry};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::RecordError;

/// Entries kept per mode and level.
pub const MAX_ENTRIES: usize = 5;

pub type SharedRecords = Arc<Mutex<RecordStore>>;

/// Whether score `a` ranks strictly above score `b` in `mode`.
fn beats(mode: Mode, a: u64, b: u64) -> bool {
    match mode {
        Mode::Classic => a < b,
        Mode::Challenge => a > b,
    }
}

/// Index of the lowest ranked entry; the newest one among equals.
fn worst_index(mode: Mode, entries: &[RecordEntry]) -> Option<usize> {
    let mut worst: Option<usize> = None;
    for (i, entry) in entries.iter().enumerate() {
        match worst {
            Some(w) if beats(mode, entry.score, entries[w].score) => {}
            _ => worst = Some(i),
        }
    }
    worst
}

fn evict_overflow(mode: Mode, bucket: &mut Vec<RecordEntry>) -> Option<RecordEntry> {
    let mut evicted = None;
    while bucket.len() > MAX_ENTRIES {
        let i = worst_index(mode, bucket)?;
        evicted = Some(bucket.remove(i));
    }
    evicted
}

/// Best scores per mode and level.
///
/// Serialized as `{mode: {level: {name: score}}}` with each level written
/// best first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordBook {
    buckets: BTreeMap<(Mode, Level), Vec<RecordEntry>>,
}

impl RecordBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, mode: Mode, level: Level) -> &[RecordEntry] {
        self.buckets
            .get(&(mode, level))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn bucket_mut(&mut self, mode: Mode, level: Level) -> &mut Vec<RecordEntry> {
        self.buckets.entry((mode, level)).or_default()
    }

    pub fn len(&self, mode: Mode, level: Level) -> usize {
        self.bucket(mode, level).len()
    }

    /// Whether `score` would make it onto the board.
    pub fn qualifies(&self, mode: Mode, level: Level, score: u64) -> bool {
        let bucket = self.bucket(mode, level);
        if bucket.len() < MAX_ENTRIES {
            return true;
        }
        worst_index(mode, bucket).is_some_and(|i| beats(mode, score, bucket[i].score))
    }

    /// Add an entry, evicting the worst one if the board overflows.
    ///
    /// Names are unique per mode and level; a taken name is refused so the
    /// caller can ask for another. Returns the evicted entry, which may be
    /// the new one.
    pub fn insert(
        &mut self,
        mode: Mode,
        level: Level,
        name: &str,
        score: u64,
    ) -> Result<Option<RecordEntry>, RecordError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }

        let bucket = self.bucket_mut(mode, level);
        if bucket.iter().any(|entry| entry.name == name) {
            return Err(RecordError::DuplicateName(name.to_string()));
        }

        bucket.push(RecordEntry {
            name: name.to_string(),
            score,
        });
        Ok(evict_overflow(mode, bucket))
    }

    /// The best `n` entries: fastest first in classic, most rounds first in
    /// challenge. Equal scores keep their arrival order.
    pub fn top_n(&self, mode: Mode, level: Level, n: usize) -> Vec<RecordEntry> {
        let mut entries = self.bucket(mode, level).to_vec();
        match mode {
            Mode::Classic => entries.sort_by_key(|entry| entry.score),
            Mode::Challenge => entries.sort_by_key(|entry| Reverse(entry.score)),
        }
        entries.truncate(n);
        entries
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
    }
}

struct RankedScores(Vec<RecordEntry>);

impl Serialize for RankedScores {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.name, &entry.score)?;
        }
        map.end()
    }
}

impl Serialize for RecordBook {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut modes = serializer.serialize_map(Some(Mode::ALL.len()))?;
        for mode in Mode::ALL {
            let levels: BTreeMap<Level, RankedScores> = Level::ALL
                .into_iter()
                .map(|level| (level, RankedScores(self.top_n(mode, level, MAX_ENTRIES))))
                .collect();
            modes.serialize_entry(&mode, &levels)?;
        }
        modes.end()
    }
}

/// Name/score pairs in document order.
struct Scores(Vec<(String, u64)>);

impl<'de> Deserialize<'de> for Scores {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = Scores;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of player names to scores")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Scores, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut scores = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, score)) = access.next_entry::<String, u64>()? {
                    scores.push((name, score));
                }
                Ok(Scores(scores))
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

impl<'de> Deserialize<'de> for RecordBook {
    /// Accepts `null` levels as empty and trims levels holding too many
    /// entries.
    fn deserialize<D>(deserializer: D) -> Result<RecordBook, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<Mode, BTreeMap<Level, Option<Scores>>>::deserialize(deserializer)?;
        let mut book = RecordBook::new();
        for (mode, levels) in raw {
            for (level, scores) in levels {
                let bucket = book.bucket_mut(mode, level);
                for (name, score) in scores.map(|s| s.0).unwrap_or_default() {
                    if bucket.iter().any(|entry| entry.name == name) {
                        continue;
                    }
                    bucket.push(RecordEntry { name, score });
                }
                evict_overflow(mode, bucket);
            }
        }
        Ok(book)
    }
}

/// The record book together with the file it lives in.
#[derive(Debug)]
pub struct RecordStore {
    book: RecordBook,
    path: PathBuf,
}

/// Location of the records file, `RECORDS_PATH` or `records.json`.
pub fn records_path() -> PathBuf {
    env::var("RECORDS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("records.json"))
}

impl RecordStore {
    /// Read the records at `path`. A missing file is an empty book.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let path = path.into();
        let book = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => RecordBook::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { book, path })
    }

    /// Like [`RecordStore::load`], but starts empty when the file cannot be
    /// read. Saving later overwrites the unreadable file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => {
                info!("Loaded records from {}", path.display());
                store
            }
            Err(e) => {
                warn!(
                    "Could not load records from {}, starting empty: {}",
                    path.display(),
                    e
                );
                Self {
                    book: RecordBook::new(),
                    path,
                }
            }
        }
    }

    pub fn shared(self) -> SharedRecords {
        Arc::new(Mutex::new(self))
    }

    pub fn book(&self) -> &RecordBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut RecordBook {
        &mut self.book
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), RecordError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.book)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}
