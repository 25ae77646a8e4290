//! Frequency/recency index over executable paths

/// Number of hash buckets. Fixed at initialization; the dataset (distinct
/// executables and packages on one host) stays small relative to this, so
/// there is no resize policy.
const BUCKET_COUNT: usize = 256;

/// One observed path with its running count and last-seen unix timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub count: u64,
    pub last_seen: u64,
}

/// Chained hash map keyed by absolute path.
///
/// Iteration order is bucket then chain order, not insertion or lexicographic
/// order. The serialized log preserves this order, so it must stay stable for
/// a given set of keys.
pub struct FrequencyIndex {
    buckets: Vec<Vec<(u64, Entry)>>,
    len: usize,
}

fn hash_key(key: &str) -> u64 {
    // djb2
    let mut h: u64 = 5381;
    for &b in key.as_bytes() {
        h = h.wrapping_mul(33).wrapping_add(u64::from(b));
    }
    h
}

impl FrequencyIndex {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); BUCKET_COUNT],
            len: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<(u64, u64)> {
        let h = hash_key(key);
        self.buckets[h as usize % BUCKET_COUNT]
            .iter()
            .find(|(eh, e)| *eh == h && e.key == key)
            .map(|(_, e)| (e.count, e.last_seen))
    }

    /// Current count for `key`, zero when absent.
    pub fn count(&self, key: &str) -> u64 {
        self.get(key).map_or(0, |(count, _)| count)
    }

    /// Upsert: update an existing entry in place or append a new one to the
    /// tail of its bucket chain. The only mutation during normal operation.
    pub fn set(&mut self, key: &str, count: u64, last_seen: u64) {
        let h = hash_key(key);
        let bucket = &mut self.buckets[h as usize % BUCKET_COUNT];
        for (eh, e) in bucket.iter_mut() {
            if *eh == h && e.key == key {
                e.count = count;
                e.last_seen = last_seen;
                return;
            }
        }
        bucket.push((
            h,
            Entry {
                key: key.to_string(),
                count,
                last_seen,
            },
        ));
        self.len += 1;
    }

    /// Entries in bucket/chain order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.buckets.iter().flatten().map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for FrequencyIndex {
    fn default() -> Self {
        Self::new()
    }
}
