//! Output descriptor source abstraction
//!
//! A platform backend reports a full snapshot of connected outputs each time
//! the display configuration changes. `OutputTracker` turns consecutive
//! snapshots into the add/remove/geometry/primary events the pool consumes,
//! and keeps a handle stable for as long as a connector stays connected.

use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

use crate::types::{Output, OutputHandle, Rect};

/// Hardware-level notification from the output source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Added(Output),
    Removed(OutputHandle),
    GeometryChanged(OutputHandle, Rect),
    PrimaryChanged {
        old: Option<String>,
        new: Option<String>,
    },
}

/// Something that can enumerate outputs and report changes to them
pub trait OutputSource {
    /// Currently connected outputs, in the order the source first saw them
    fn outputs(&self) -> &[Output];

    /// Connector name of the current primary output
    fn primary(&self) -> Option<String>;

    /// Re-read the display configuration and return what changed since the last call
    fn refresh(&mut self) -> Result<Vec<OutputEvent>>;
}

/// Snapshot differ shared by all backends
#[derive(Debug, Default)]
pub struct OutputTracker {
    outputs: Vec<Output>,
    primary: Option<String>,
    next_handle: u64,
}

impl OutputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn primary(&self) -> Option<String> {
        self.primary.clone()
    }

    /// Replace the current snapshot with `current` (connector name, geometry)
    /// and `primary`, returning events in the order removals, additions,
    /// geometry changes, primary change.
    pub fn update(&mut self, current: Vec<(String, Rect)>, primary: Option<String>) -> Vec<OutputEvent> {
        let mut events = Vec::new();

        // A connector listed twice keeps its first geometry
        let mut names = HashSet::new();
        let current: Vec<(String, Rect)> = current
            .into_iter()
            .filter(|(name, _)| names.insert(name.clone()))
            .collect();

        // Removals
        self.outputs.retain(|output| {
            if names.contains(&output.name) {
                true
            } else {
                debug!(handle = %output.handle, connector = %output.name, "Output disappeared");
                events.push(OutputEvent::Removed(output.handle));
                false
            }
        });

        // Additions, in the order the backend listed them
        let mut geometry_changes = Vec::new();
        for (name, geometry) in &current {
            match self.outputs.iter_mut().find(|o| o.name == *name) {
                Some(existing) => {
                    if existing.geometry != *geometry {
                        existing.geometry = *geometry;
                        geometry_changes.push(OutputEvent::GeometryChanged(existing.handle, *geometry));
                    }
                }
                None => {
                    let handle = OutputHandle(self.next_handle);
                    self.next_handle += 1;
                    let output = Output::new(handle, name.clone(), *geometry);
                    debug!(handle = %handle, connector = %name, geometry = %geometry, "Output appeared");
                    self.outputs.push(output.clone());
                    events.push(OutputEvent::Added(output));
                }
            }
        }
        events.extend(geometry_changes);

        if primary != self.primary {
            events.push(OutputEvent::PrimaryChanged {
                old: self.primary.take(),
                new: primary.clone(),
            });
            self.primary = primary;
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(items: &[(&str, Rect)]) -> Vec<(String, Rect)> {
        items.iter().map(|(n, r)| (n.to_string(), *r)).collect()
    }

    const FHD: Rect = Rect::new(0, 0, 1920, 1080);
    const RIGHT: Rect = Rect::new(1920, 0, 2560, 1440);

    #[test]
    fn test_initial_snapshot_adds_everything() {
        let mut tracker = OutputTracker::new();
        let events = tracker.update(snapshot(&[("eDP-1", FHD), ("HDMI-1", RIGHT)]), Some("eDP-1".into()));

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], OutputEvent::Added(o) if o.name == "eDP-1"));
        assert!(matches!(&events[1], OutputEvent::Added(o) if o.name == "HDMI-1"));
        assert_eq!(
            events[2],
            OutputEvent::PrimaryChanged {
                old: None,
                new: Some("eDP-1".into())
            }
        );
        assert_eq!(tracker.outputs().len(), 2);
    }

    #[test]
    fn test_unchanged_snapshot_is_silent() {
        let mut tracker = OutputTracker::new();
        tracker.update(snapshot(&[("eDP-1", FHD)]), Some("eDP-1".into()));
        assert!(tracker.update(snapshot(&[("eDP-1", FHD)]), Some("eDP-1".into())).is_empty());
    }

    #[test]
    fn test_handles_stay_stable_and_are_not_reused() {
        let mut tracker = OutputTracker::new();
        tracker.update(snapshot(&[("eDP-1", FHD), ("HDMI-1", RIGHT)]), None);
        let edp = tracker.outputs()[0].handle;
        let hdmi = tracker.outputs()[1].handle;

        let events = tracker.update(snapshot(&[("eDP-1", FHD)]), None);
        assert_eq!(events, vec![OutputEvent::Removed(hdmi)]);
        assert_eq!(tracker.outputs()[0].handle, edp);

        // Reconnecting gets a fresh handle
        let events = tracker.update(snapshot(&[("eDP-1", FHD), ("HDMI-1", RIGHT)]), None);
        match &events[0] {
            OutputEvent::Added(output) => assert_ne!(output.handle, hdmi),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_geometry_change_and_event_order() {
        let mut tracker = OutputTracker::new();
        tracker.update(snapshot(&[("eDP-1", FHD), ("HDMI-1", RIGHT)]), Some("eDP-1".into()));
        let edp = tracker.outputs()[0].handle;
        let hdmi = tracker.outputs()[1].handle;

        let moved = Rect::new(2560, 0, 1920, 1080);
        let events = tracker.update(
            snapshot(&[("eDP-1", moved), ("DP-1", RIGHT)]),
            Some("DP-1".into()),
        );

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], OutputEvent::Removed(hdmi));
        assert!(matches!(&events[1], OutputEvent::Added(o) if o.name == "DP-1"));
        assert_eq!(events[2], OutputEvent::GeometryChanged(edp, moved));
        assert_eq!(
            events[3],
            OutputEvent::PrimaryChanged {
                old: Some("eDP-1".into()),
                new: Some("DP-1".into())
            }
        );
    }

    #[test]
    fn test_duplicate_names_collapse_to_first() {
        let mut tracker = OutputTracker::new();
        let events = tracker.update(snapshot(&[("DP-1", FHD), ("DP-1", RIGHT)]), None);
        assert_eq!(events.len(), 1);
        assert_eq!(tracker.outputs()[0].geometry, FHD);
    }
}
