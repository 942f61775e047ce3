//! Deduplicating suspect-address counter.
//!
//! The list preserves insertion order so blocklist exports are stable across
//! runs with the same input, and lookups are plain string equality. Windows
//! are small (at most `window_size` distinct sources), so a linear scan
//! keeps the structure trivially serialisable for the wire.

/// One counted suspect address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspectEntry {
    pub addr: String,
    pub count: u32,
}

/// Insertion-ordered mapping from address to occurrence count.
///
/// # Examples
/// ```
/// use flowsentry_core::SuspectList;
///
/// let mut list = SuspectList::new();
/// list.add("10.0.0.1");
/// list.add("10.0.0.2");
/// list.add("10.0.0.1");
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.entries()[0].count, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspectList {
    entries: Vec<SuspectEntry>,
}

impl SuspectList {
    pub fn new() -> Self {
        SuspectList::default()
    }

    /// Records one occurrence of `addr`. Empty addresses are ignored.
    pub fn add(&mut self, addr: &str) {
        self.add_with_count(addr, 1);
    }

    /// Records `count` occurrences of `addr` at once (wire reassembly).
    pub fn add_with_count(&mut self, addr: &str, count: u32) {
        if addr.is_empty() || count == 0 {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.addr == addr) {
            entry.count += count;
            return;
        }
        self.entries.push(SuspectEntry {
            addr: addr.to_string(),
            count,
        });
    }

    /// Folds another list in, once per distinct address.
    ///
    /// This is the cross-window aggregation rule: the resulting counts are
    /// windows-of-detection, not flow multiplicities.
    pub fn merge_distinct(&mut self, other: &SuspectList) {
        for entry in &other.entries {
            self.add(&entry.addr);
        }
    }

    /// Folds another list in with full multiplicity (per-window merge).
    pub fn merge_counts(&mut self, other: &SuspectList) {
        for entry in &other.entries {
            self.add_with_count(&entry.addr, entry.count);
        }
    }

    pub fn entries(&self) -> &[SuspectEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts; equals the number of single `add` calls recorded.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.count)).sum()
    }

    /// Entries whose count reaches `min_count`, in insertion order.
    pub fn filtered(&self, min_count: u32) -> impl Iterator<Item = &SuspectEntry> {
        self.entries.iter().filter(move |e| e.count >= min_count)
    }
}
