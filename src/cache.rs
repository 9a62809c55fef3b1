// Offsets keyed by image-series UID

use crate::geometry::Point3;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCache {
    entries: BTreeMap<String, Point3>,
}

impl OffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, series_uid: &str) -> Option<Point3> {
        self.entries.get(series_uid).copied()
    }

    pub fn insert(&mut self, series_uid: &str, offset: Point3) -> Option<Point3> {
        self.entries.insert(series_uid.to_string(), offset)
    }

    pub fn remove(&mut self, series_uid: &str) -> Option<Point3> {
        self.entries.remove(series_uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached offset for `series_uid`, running `search` only on a miss.
    /// A failed search caches nothing.
    pub fn get_or_try_insert_with<E, F>(&mut self, series_uid: &str, search: F) -> std::result::Result<Point3, E>
    where
        F: FnOnce() -> std::result::Result<Point3, E>,
    {
        if let Some(offset) = self.get(series_uid) {
            log::debug!("Found offset for series {} in cache: {}", series_uid, offset);
            return Ok(offset);
        }

        let offset = search()?;
        log::debug!("Storing offset for series {}: {}", series_uid, offset);
        self.entries.insert(series_uid.to_string(), offset);
        Ok(offset)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_runs_once_per_series() {
        let mut cache = OffsetCache::new();
        let mut searches = 0;

        for _ in 0..3 {
            let offset = cache
                .get_or_try_insert_with("1.2.3", || {
                    searches += 1;
                    Ok::<_, String>(Point3::new(0.5, 0.0, -12.25))
                })
                .unwrap();
            assert_eq!(offset, Point3::new(0.5, 0.0, -12.25));
        }
        assert_eq!(searches, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_search_is_not_cached() {
        let mut cache = OffsetCache::new();
        let result = cache.get_or_try_insert_with("1.2.3", || Err("holes not found"));
        assert_eq!(result, Err("holes not found"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut cache = OffsetCache::new();
        cache.insert("1.2.3", Point3::new(1.0, 2.0, 3.0));
        cache.insert("4.5.6", Point3::new(-1.0, 0.0, 0.25));

        let back = OffsetCache::from_json(&cache.to_json().unwrap()).unwrap();
        assert_eq!(back, cache);
        assert_eq!(back.get("4.5.6"), Some(Point3::new(-1.0, 0.0, 0.25)));
        assert_eq!(back.get("7.8.9"), None);
    }
}
