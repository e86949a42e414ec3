//! Binaural filter store.
//!
//! A filter set holds, for one ambisonic order and one ear, the head related
//! impulse responses of every ambisonic channel. Sets are addressed by a
//! [`FilterKey`] whose textual form is `"<order>OA_<ear>"`, e.g. `"3OA_L"`.
//!
//! The payloads are opaque to this crate. Stores are built once, then shared
//! read-only between any number of decoders.
//!
//! ```no_run
//! use binaural_filters::{Ear, FilterKey, FilterStore, MemoryStore};
//!
//! let store = MemoryStore::from_dir("filters").unwrap();
//! let key = FilterKey::new(3, Ear::Left).unwrap();
//!
//! let blob = store.filter(key);
//! let same = store.filter_by_name("3OA_L");
//! assert_eq!(blob, same);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};

/// Lowest ambisonic order a filter set exists for.
pub const MIN_ORDER: u8 = 1;
/// Highest ambisonic order a filter set exists for.
pub const MAX_ORDER: u8 = 7;

const FILE_EXTENSION: &str = "wav";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("Unknown filter key: {0:?}")]
    UnknownKey(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ear {
    Left,
    Right,
}

impl Ear {
    pub const ALL: [Ear; 2] = [Ear::Left, Ear::Right];

    fn tag(self) -> char {
        match self {
            Ear::Left => 'L',
            Ear::Right => 'R',
        }
    }
}

/// Identifies one filter set: an ambisonic order in `1..=7` and an ear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterKey {
    order: u8,
    ear: Ear,
}

impl FilterKey {
    /// Returns `None` when `order` has no filter set.
    pub fn new(order: u8, ear: Ear) -> Option<Self> {
        (MIN_ORDER..=MAX_ORDER)
            .contains(&order)
            .then_some(FilterKey { order, ear })
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn ear(&self) -> Ear {
        self.ear
    }

    /// Every valid key, ordered by order then ear.
    pub fn all() -> impl Iterator<Item = FilterKey> {
        (MIN_ORDER..=MAX_ORDER)
            .flat_map(|order| Ear::ALL.into_iter().map(move |ear| FilterKey { order, ear }))
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}OA_{}", self.order, self.ear.tag())
    }
}

impl FromStr for FilterKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || Error::UnknownKey(s.to_owned());

        let (order, ear) = s.split_once("OA_").ok_or_else(unknown)?;

        let ear = match ear {
            "L" => Ear::Left,
            "R" => Ear::Right,
            _ => return Err(unknown()),
        };

        // reject signs, padding and multi digit forms like "03OA_L"
        if order.len() != 1 {
            return Err(unknown());
        }

        let order = order.parse::<u8>().map_err(|_| unknown())?;
        FilterKey::new(order, ear).ok_or_else(unknown)
    }
}

/// Read-only source of filter payloads.
///
/// Implementations must be safe to query concurrently from several decoders.
pub trait FilterStore: Send + Sync {
    /// Raw payload for `key`, or `None` if the store has no such set.
    fn filter(&self, key: FilterKey) -> Option<&[u8]>;

    /// Lookup by the textual key form. Unrecognized names are absent.
    fn filter_by_name(&self, name: &str) -> Option<&[u8]> {
        name.parse::<FilterKey>()
            .ok()
            .and_then(|key| self.filter(key))
    }
}

/// Filter store holding its payloads in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    filters: HashMap<FilterKey, Box<[u8]>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Load every `<key>.wav` file found in `dir`, e.g. `dir/1OA_L.wav`.
    ///
    /// Keys without a file stay absent. Files with other names are ignored.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let mut store = MemoryStore::new();

        for key in FilterKey::all() {
            let path = dir.join(format!("{key}.{FILE_EXTENSION}"));

            if !path.is_file() {
                continue;
            }

            let blob = std::fs::read(&path)?;
            debug!("Loaded filter {key} ({} bytes) from {}", blob.len(), path.display());
            store.insert(key, blob);
        }

        info!("Loaded {} filter sets from {}", store.len(), dir.display());
        Ok(store)
    }

    /// Insert or replace the payload for `key`.
    pub fn insert<B: Into<Box<[u8]>>>(&mut self, key: FilterKey, blob: B) -> Option<Box<[u8]>> {
        self.filters.insert(key, blob.into())
    }

    pub fn with_filter<B: Into<Box<[u8]>>>(mut self, key: FilterKey, blob: B) -> Self {
        self.insert(key, blob);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = FilterKey> + '_ {
        self.filters.keys().copied()
    }
}

impl FilterStore for MemoryStore {
    fn filter(&self, key: FilterKey) -> Option<&[u8]> {
        self.filters.get(&key).map(|blob| &**blob)
    }
}

impl<S: FilterStore + ?Sized> FilterStore for &S {
    fn filter(&self, key: FilterKey) -> Option<&[u8]> {
        (**self).filter(key)
    }
}

impl<S: FilterStore + ?Sized> FilterStore for std::sync::Arc<S> {
    fn filter(&self, key: FilterKey) -> Option<&[u8]> {
        (**self).filter(key)
    }
}
