//! Derived view over a fetched ads list. Filtering never touches the data it
//! reads from.
use std::collections::BTreeMap;

use crate::model::{AdItem, LinkStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdsFilter {
    /// Case-insensitive; matched against name, external id, advertiser name
    /// and screen names/locations.
    pub search: String,
    pub status: Option<LinkStatus>,
    pub advertiser_id: Option<String>,
    pub screen_id: Option<i64>,
}

impl AdsFilter {
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || self.status.is_some()
            || self.advertiser_id.is_some()
            || self.screen_id.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn matches(&self, item: &AdItem) -> bool {
        if let Some(status) = self.status {
            if item.status() != status {
                return false;
            }
        }
        if let Some(advertiser) = &self.advertiser_id {
            if item.link.advertiser_id() != Some(advertiser.as_str()) {
                return false;
            }
        }
        if let Some(screen) = self.screen_id {
            if !item.media.screens.iter().any(|s| s.screen_id == screen) {
                return false;
            }
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty() || haystack(item).any(|field| field.to_lowercase().contains(&needle))
    }

    pub fn apply<'a>(&self, items: &'a [AdItem]) -> Vec<&'a AdItem> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

fn haystack(item: &AdItem) -> impl Iterator<Item = String> + '_ {
    let screens = item.media.screens.iter().flat_map(|s| {
        std::iter::once(s.screen_name.clone())
            .chain(std::iter::once(s.screen_display_id.clone()))
            .chain(s.location_name.clone())
    });
    [item.media.name.clone(), item.external_id().to_string()]
        .into_iter()
        .chain(item.advertiser_name.clone())
        .chain(screens)
}

/// Advertisers present among linked items, as `(id, name)` sorted by name.
pub fn advertiser_options(items: &[AdItem]) -> Vec<(String, String)> {
    let mut by_id = BTreeMap::new();
    for item in items {
        if let Some(id) = item.link.advertiser_id() {
            let name = item.advertiser_name.clone().unwrap_or_else(|| id.to_string());
            by_id.entry(id.to_string()).or_insert(name);
        }
    }
    let mut options: Vec<_> = by_id.into_iter().collect();
    options.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()).then(a.0.cmp(&b.0)));
    options
}

/// Screens referenced by any item, as `(screen_id, screen_name)` sorted by name.
pub fn screen_options(items: &[AdItem]) -> Vec<(i64, String)> {
    let mut by_id = BTreeMap::new();
    for screen in items.iter().flat_map(|item| &item.media.screens) {
        by_id
            .entry(screen.screen_id)
            .or_insert_with(|| screen.screen_name.clone());
    }
    let mut options: Vec<_> = by_id.into_iter().collect();
    options.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()).then(a.0.cmp(&b.0)));
    options
}
