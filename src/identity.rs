//! Bidirectional screen id ↔ connector name table
//!
//! The table is the single source of truth for screen identities. Both maps are
//! always updated together so that `id_for_connector[name] == id` holds exactly
//! when `connector_for_id[id] == name`. ID 0 is reserved for the primary
//! connector, and new ids always fill the lowest gap.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::types::ScreenId;

#[derive(Debug, Default, Clone)]
pub struct IdentityTable {
    /// Ordered so the first gap can be found by walking the keys
    connector_for_id: BTreeMap<ScreenId, String>,
    id_for_connector: HashMap<String, ScreenId>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self, connector: &str) -> Option<ScreenId> {
        self.id_for_connector.get(connector).copied()
    }

    pub fn connector(&self, id: ScreenId) -> Option<&str> {
        self.connector_for_id.get(&id).map(String::as_str)
    }

    pub fn contains_id(&self, id: ScreenId) -> bool {
        self.connector_for_id.contains_key(&id)
    }

    /// Connector currently holding ID 0
    pub fn primary_connector(&self) -> Option<&str> {
        self.connector(0)
    }

    /// All assigned ids in ascending order
    pub fn known_ids(&self) -> Vec<ScreenId> {
        self.connector_for_id.keys().copied().collect()
    }

    /// (id, connector) pairs in ascending id order
    pub fn entries(&self) -> impl Iterator<Item = (ScreenId, &str)> {
        self.connector_for_id
            .iter()
            .map(|(id, connector)| (*id, connector.as_str()))
    }

    pub fn len(&self) -> usize {
        self.connector_for_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connector_for_id.is_empty()
    }

    pub fn first_available_id(&self) -> ScreenId {
        let mut candidate = 0;
        for &existing in self.connector_for_id.keys() {
            if existing != candidate {
                return candidate;
            }
            candidate += 1;
        }
        candidate
    }

    /// Insert a pair. Neither side may already be bound to a different partner.
    pub fn insert_mapping(&mut self, id: ScreenId, connector: &str) {
        debug_assert!(
            self.connector_for_id
                .get(&id)
                .is_none_or(|existing| existing == connector),
            "screen id {id} already bound to another connector"
        );
        debug_assert!(
            self.id_for_connector
                .get(connector)
                .is_none_or(|&existing| existing == id),
            "connector {connector} already bound to another screen id"
        );

        self.connector_for_id.insert(id, connector.to_string());
        self.id_for_connector.insert(connector.to_string(), id);
    }

    /// Look up the id of `connector`, assigning the first free one if it has none.
    /// Returns the id and whether the table changed.
    pub fn assign_or_lookup(&mut self, connector: &str) -> (ScreenId, bool) {
        if let Some(id) = self.id(connector) {
            return (id, false);
        }
        let id = self.first_available_id();
        debug!(connector = %connector, id, "Assigning new screen id");
        self.insert_mapping(id, connector);
        (id, true)
    }

    /// Move `connector` to ID 0. The previous holder of ID 0 takes over the id
    /// `connector` had before, or a freshly allocated one if it had none.
    /// Returns false when `connector` already was primary.
    pub fn set_primary(&mut self, connector: &str) -> bool {
        if self.id(connector) == Some(0) {
            return false;
        }

        let vacated_id = match self.id(connector) {
            Some(id) => id,
            None => self.first_available_id(),
        };
        let previous_primary = self.connector_for_id.get(&0).cloned();

        // Unbind the new primary from its old slot before rebinding anything
        if self.connector_for_id.get(&vacated_id).map(String::as_str) == Some(connector) {
            self.connector_for_id.remove(&vacated_id);
        }
        self.id_for_connector.remove(connector);
        self.connector_for_id.remove(&0);

        if let Some(previous) = previous_primary {
            debug!(connector = %previous, id = vacated_id, "Previous primary moves to vacated id");
            self.id_for_connector.insert(previous.clone(), vacated_id);
            self.connector_for_id.insert(vacated_id, previous);
        }

        self.insert_mapping(0, connector);
        true
    }

    /// Seed the table from persisted `(key, connector)` pairs.
    ///
    /// `primary` (if known) is bound to ID 0 before any persisted pair is
    /// considered. Pairs are then taken in ascending id order; a pair is only
    /// accepted if its key is a valid id, its connector is non-empty and
    /// neither side is already claimed. Returns the keys that were rejected so
    /// the caller can purge them from the store.
    pub fn load_entries(
        &mut self,
        primary: Option<&str>,
        persisted: impl IntoIterator<Item = (String, String)>,
    ) -> Vec<String> {
        self.connector_for_id.clear();
        self.id_for_connector.clear();

        if let Some(primary) = primary.filter(|p| !p.is_empty()) {
            self.insert_mapping(0, primary);
        }

        let mut parsed = Vec::new();
        let mut rejected = Vec::new();
        for (key, connector) in persisted {
            match key.trim().parse::<ScreenId>() {
                Ok(id) => parsed.push((id, key, connector)),
                Err(_) => {
                    warn!(key = %key, connector = %connector, "Discarding persisted screen mapping with invalid id");
                    rejected.push(key);
                }
            }
        }
        parsed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        for (id, key, connector) in parsed {
            if connector.is_empty() {
                warn!(key = %key, "Discarding persisted screen mapping with empty connector");
                rejected.push(key);
                continue;
            }
            if !self.connector_for_id.contains_key(&id) && !self.id_for_connector.contains_key(&connector) {
                self.insert_mapping(id, &connector);
            } else if self.id(&connector) != Some(id) {
                warn!(key = %key, connector = %connector, "Discarding conflicting persisted screen mapping");
                rejected.push(key);
            }
        }

        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn assert_maps_inverse(table: &IdentityTable) {
        assert_eq!(table.connector_for_id.len(), table.id_for_connector.len());
        for (id, connector) in &table.connector_for_id {
            assert_eq!(table.id_for_connector.get(connector), Some(id));
        }
    }

    #[test]
    fn test_first_available_id_fills_gaps() {
        let mut table = IdentityTable::new();
        assert_eq!(table.first_available_id(), 0);

        table.insert_mapping(0, "eDP-1");
        table.insert_mapping(1, "HDMI-1");
        table.insert_mapping(3, "DP-2");
        assert_eq!(table.first_available_id(), 2);

        table.insert_mapping(2, "DP-1");
        assert_eq!(table.first_available_id(), 4);
    }

    #[test]
    fn test_first_available_id_when_zero_is_free() {
        let mut table = IdentityTable::new();
        table.insert_mapping(1, "HDMI-1");
        table.insert_mapping(2, "DP-1");
        assert_eq!(table.first_available_id(), 0);
    }

    #[test]
    fn test_assign_or_lookup() {
        let mut table = IdentityTable::new();
        assert_eq!(table.assign_or_lookup("eDP-1"), (0, true));
        assert_eq!(table.assign_or_lookup("HDMI-1"), (1, true));

        // Already known: same id, nothing changes
        assert_eq!(table.assign_or_lookup("eDP-1"), (0, false));
        assert_eq!(table.len(), 2);
        assert_maps_inverse(&table);
    }

    #[test]
    fn test_unknown_lookups() {
        let table = IdentityTable::new();
        assert_eq!(table.id("nope"), None);
        assert_eq!(table.connector(7), None);
        assert_eq!(table.primary_connector(), None);
    }

    #[test]
    fn test_set_primary_swaps_ids() {
        let mut table = IdentityTable::new();
        table.insert_mapping(0, "eDP-1");
        table.insert_mapping(1, "DP-1");
        table.insert_mapping(2, "HDMI-1");

        assert!(table.set_primary("HDMI-1"));

        assert_eq!(table.id("HDMI-1"), Some(0));
        assert_eq!(table.id("eDP-1"), Some(2));
        assert_eq!(table.id("DP-1"), Some(1));
        assert_eq!(table.primary_connector(), Some("HDMI-1"));
        assert_maps_inverse(&table);
    }

    #[test]
    fn test_set_primary_is_idempotent() {
        let mut table = IdentityTable::new();
        table.insert_mapping(0, "eDP-1");
        table.insert_mapping(1, "HDMI-1");

        assert!(table.set_primary("HDMI-1"));
        let snapshot: Vec<_> = table.entries().map(|(id, c)| (id, c.to_string())).collect();

        assert!(!table.set_primary("HDMI-1"));
        let again: Vec<_> = table.entries().map(|(id, c)| (id, c.to_string())).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn test_set_primary_unknown_connector() {
        let mut table = IdentityTable::new();
        table.insert_mapping(0, "eDP-1");
        table.insert_mapping(1, "HDMI-1");

        // New connector gets a fresh id, which the old primary then takes over
        assert!(table.set_primary("DP-3"));
        assert_eq!(table.id("DP-3"), Some(0));
        assert_eq!(table.id("eDP-1"), Some(2));
        assert_eq!(table.id("HDMI-1"), Some(1));
        assert_maps_inverse(&table);
    }

    #[test]
    fn test_set_primary_without_previous_primary() {
        let mut table = IdentityTable::new();
        table.insert_mapping(1, "HDMI-1");
        table.insert_mapping(2, "DP-1");

        assert!(table.set_primary("DP-1"));
        assert_eq!(table.id("DP-1"), Some(0));
        assert_eq!(table.id("HDMI-1"), Some(1));
        // Id 2 was vacated and nobody took it over
        assert!(!table.contains_id(2));
        assert_maps_inverse(&table);
    }

    #[test]
    fn test_load_entries_accepts_consistent_pairs() {
        let mut table = IdentityTable::new();
        let rejected = table.load_entries(None, pairs(&[("1", "HDMI-1"), ("0", "eDP-1"), ("4", "DP-2")]));

        assert!(rejected.is_empty());
        assert_eq!(table.known_ids(), vec![0, 1, 4]);
        assert_eq!(table.connector(4), Some("DP-2"));
        assert_eq!(table.primary_connector(), Some("eDP-1"));
    }

    #[test]
    fn test_load_entries_primary_claims_zero() {
        let mut table = IdentityTable::new();
        let rejected = table.load_entries(Some("HDMI-1"), pairs(&[("0", "eDP-1"), ("1", "HDMI-1")]));

        // "0" conflicts with the live primary; "1" is HDMI-1 which already holds 0
        assert_eq!(rejected, vec!["0".to_string(), "1".to_string()]);
        assert_eq!(table.id("HDMI-1"), Some(0));
        assert_eq!(table.id("eDP-1"), None);
    }

    #[test]
    fn test_load_entries_primary_matching_persisted_zero() {
        let mut table = IdentityTable::new();
        let rejected = table.load_entries(Some("eDP-1"), pairs(&[("0", "eDP-1"), ("1", "HDMI-1")]));
        assert!(rejected.is_empty());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_load_entries_purges_corrupted_state() {
        let mut table = IdentityTable::new();
        let rejected = table.load_entries(
            None,
            pairs(&[
                ("0", "eDP-1"),
                ("1", "eDP-1"),   // duplicate connector
                ("2", ""),        // empty connector
                ("abc", "DP-1"),  // invalid id
                ("-3", "DP-2"),   // negative id
                ("5", "HDMI-1"),
            ]),
        );

        let mut rejected = rejected;
        rejected.sort();
        assert_eq!(rejected, vec!["-3", "1", "2", "abc"]);
        assert_eq!(table.known_ids(), vec![0, 5]);
        assert_maps_inverse(&table);
    }

    #[test]
    fn test_load_entries_resets_previous_state() {
        let mut table = IdentityTable::new();
        table.insert_mapping(3, "VGA-1");
        table.load_entries(None, pairs(&[("0", "eDP-1")]));
        assert_eq!(table.id("VGA-1"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_maps_stay_inverse_under_mixed_operations() {
        let mut table = IdentityTable::new();
        let connectors = ["eDP-1", "HDMI-1", "DP-1", "DP-2", "VGA-1"];
        for (step, connector) in connectors.iter().enumerate() {
            table.assign_or_lookup(connector);
            if step % 2 == 1 {
                table.set_primary(connector);
            }
            assert_maps_inverse(&table);
            // The first free id is never one that is already taken
            assert!(!table.contains_id(table.first_available_id()));
        }
        assert_eq!(table.primary_connector(), Some("DP-2"));
    }
}
