use std::collections::HashMap;

use crate::model::AdsView;

/// Ads views keyed by `includeArchived`. Any command marks every entry stale;
/// nothing is patched in place.
#[derive(Debug, Default)]
pub struct ViewCache {
    entries: HashMap<bool, Entry>,
    generation: u64,
}

#[derive(Debug)]
struct Entry {
    view: AdsView,
    stale: bool,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for `include_archived`, if any.
    pub fn get(&self, include_archived: bool) -> Option<&AdsView> {
        self.entries
            .get(&include_archived)
            .filter(|entry| !entry.stale)
            .map(|entry| &entry.view)
    }

    pub fn is_stale(&self, include_archived: bool) -> bool {
        self.entries
            .get(&include_archived)
            .map_or(true, |entry| entry.stale)
    }

    /// Counter bumped by every invalidation. Capture it before fetching and
    /// hand it back to `put`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stores `view` unless an invalidation happened since `fetched_at`, in
    /// which case the response may predate a command and is dropped.
    pub fn put(&mut self, include_archived: bool, view: AdsView, fetched_at: u64) -> bool {
        if fetched_at != self.generation {
            return false;
        }
        self.entries
            .insert(include_archived, Entry { view, stale: false });
        true
    }

    pub fn invalidate_all(&mut self) {
        self.generation += 1;
        for entry in self.entries.values_mut() {
            entry.stale = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AdsSummary;

    fn view(total: u64) -> AdsView {
        AdsView {
            items: vec![],
            summary: AdsSummary {
                total,
                unlinked: total,
                ..Default::default()
            },
        }
    }

    #[test]
    fn entries_are_keyed_by_archive_flag() {
        let mut cache = ViewCache::new();
        let gen = cache.generation();
        assert!(cache.put(false, view(2), gen));
        assert!(cache.get(true).is_none());
        assert_eq!(cache.get(false).unwrap().summary.total, 2);
    }

    #[test]
    fn invalidate_marks_everything_stale() {
        let mut cache = ViewCache::new();
        cache.put(false, view(1), 0);
        cache.put(true, view(3), 0);
        cache.invalidate_all();
        assert!(cache.get(false).is_none());
        assert!(cache.is_stale(true));
    }

    #[test]
    fn fetch_started_before_invalidation_is_dropped() {
        let mut cache = ViewCache::new();
        let gen = cache.generation();
        cache.invalidate_all();
        assert!(!cache.put(false, view(1), gen));
        assert!(cache.get(false).is_none());
    }
}
