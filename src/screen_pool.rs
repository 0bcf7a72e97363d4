//! Screen pool controller
//!
//! Owns the identity table and the per-output classification, reacts to
//! hardware notifications and publishes changes of the logical screen set.
//!
//! Everything runs on the caller's thread and every handler runs to
//! completion before the next event is fed in. The only deferred work is
//! driven by two single-shot timers the event loop polls:
//! - the reconsider timer coalesces geometry bursts into one redundancy sweep
//! - the save timer spaces out writes of the mapping to the store

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConnectorStore, PoolSettings};
use crate::identity::IdentityTable;
use crate::output::OutputEvent;
use crate::redundancy::{is_output_fake, is_output_suppressed};
use crate::timer::SingleShotTimer;
use crate::types::{Output, OutputHandle, Rect, ScreenEvent, ScreenId};

/// Classification of a tracked output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Part of the logical screen set
    Live,
    /// Suppressed: a mirror of another output, or fake
    Redundant,
}

pub struct ScreenPool<S: ConnectorStore> {
    store: S,
    settings: PoolSettings,
    table: IdentityTable,
    /// Connected outputs in arrival order
    outputs: Vec<Output>,
    states: HashMap<OutputHandle, OutputState>,
    /// Primary as last reported by the display server
    reported_primary: Option<String>,
    reconsider_timer: SingleShotTimer,
    save_timer: SingleShotTimer,
    subscribers: Vec<Sender<ScreenEvent>>,
}

impl<S: ConnectorStore> ScreenPool<S> {
    pub fn new(store: S, settings: PoolSettings) -> Self {
        Self {
            store,
            reconsider_timer: SingleShotTimer::new(settings.reconsider_delay),
            save_timer: SingleShotTimer::new(settings.save_cooldown),
            settings,
            table: IdentityTable::new(),
            outputs: Vec::new(),
            states: HashMap::new(),
            reported_primary: None,
            subscribers: Vec::new(),
        }
    }

    /// Receive logical screen added/removed events from now on
    pub fn subscribe(&mut self) -> Receiver<ScreenEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Restore the persisted mapping and take over the currently connected outputs.
    ///
    /// Every real output gets an id before any of them is classified, so no
    /// consumer ever sees a connected output without one.
    pub fn load(&mut self, outputs: &[Output], primary: Option<&str>) {
        let primary = primary.filter(|name| !self.is_fake_name(name));
        self.reported_primary = primary.map(str::to_string);

        let rejected = self.table.load_entries(primary, self.store.read_all());
        let mut changed = !rejected.is_empty();
        for key in &rejected {
            self.store.delete_entry(key);
        }
        info!(
            screens = self.table.len(),
            discarded = rejected.len(),
            primary = ?primary,
            "Loaded screen id mapping"
        );

        self.outputs = outputs.to_vec();
        self.states.clear();

        for output in outputs {
            if self.is_fake(output) {
                continue;
            }
            let (id, assigned) = self.table.assign_or_lookup(&output.name);
            if assigned {
                info!(connector = %output.name, id, "Mapped connected screen");
                changed = true;
            }
        }
        if changed || !self.store_matches_table() {
            self.save();
        }

        for output in outputs {
            self.classify_new(output.clone());
        }
    }

    /// Feed one hardware notification into the pool
    pub fn handle_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Added(output) => self.handle_output_added(output),
            OutputEvent::Removed(handle) => self.handle_output_removed(handle),
            OutputEvent::GeometryChanged(handle, geometry) => self.handle_geometry_changed(handle, geometry),
            OutputEvent::PrimaryChanged { old, new } => {
                self.handle_primary_changed(old.as_deref(), new.as_deref())
            }
        }
    }

    pub fn handle_output_added(&mut self, output: Output) {
        match self.outputs.iter_mut().find(|o| o.handle == output.handle) {
            Some(existing) => *existing = output.clone(),
            None => self.outputs.push(output.clone()),
        }

        // Hotplugged screens get their id before classification so they can
        // win redundancy tie-breaks on their own id
        self.ensure_id(&output);

        self.reconsider_timer.start(Instant::now());
        self.classify_new(output);
    }

    pub fn handle_output_removed(&mut self, handle: OutputHandle) {
        let Some(position) = self.outputs.iter().position(|o| o.handle == handle) else {
            debug!(handle = %handle, "Ignoring removal of untracked output");
            return;
        };
        let output = self.outputs.remove(position);
        self.reconsider_timer.start(Instant::now());

        match self.states.remove(&handle) {
            Some(OutputState::Live) => {
                info!(connector = %output.name, handle = %handle, "Screen removed");
                self.emit(ScreenEvent::Removed(output));
            }
            _ => {
                debug!(connector = %output.name, handle = %handle, "Suppressed output disconnected");
            }
        }
    }

    pub fn handle_geometry_changed(&mut self, handle: OutputHandle, geometry: Rect) {
        if let Some(output) = self.outputs.iter_mut().find(|o| o.handle == handle) {
            trace!(connector = %output.name, geometry = %geometry, "Output geometry changed");
            output.geometry = geometry;
            // An output that settled from an empty geometry needs its id now
            let output = output.clone();
            self.ensure_id(&output);
        }
        // Geometry arrives in bursts that are inconsistent until they settle
        self.reconsider_timer.start(Instant::now());
    }

    pub fn handle_primary_changed(&mut self, old: Option<&str>, new: Option<&str>) {
        // A new primary can move the old one; both overlap for an instant and
        // an immediate check would report a spurious mirror
        self.reconsider_timer.start(Instant::now());
        self.reported_primary = new.map(str::to_string);

        let old_primary = old.and_then(|name| self.output_by_name(name)).cloned();
        let Some(new_primary) = new.and_then(|name| self.output_by_name(name)).cloned() else {
            debug!(old = ?old, new = ?new, "Primary output not known yet, ignoring");
            return;
        };
        if old_primary.as_ref().is_some_and(|o| o.handle == new_primary.handle)
            || new_primary.geometry.is_null()
        {
            debug!(old = ?old, new = ?new, "Ambiguous primary change, ignoring");
            return;
        }

        if self.no_real_outputs_connected() {
            warn!(connector = %new_primary.name, "No real outputs left, treating primary as removed");
            self.handle_output_removed(new_primary.handle);
            return;
        }

        let had_real_primary = old_primary.as_ref().is_some_and(|o| !self.is_fake(o));
        if !had_real_primary {
            info!(connector = %new_primary.name, "First real primary output appeared");
            let name = new_primary.name.clone();
            let is_real = !self.is_fake(&new_primary);
            self.handle_output_added(new_primary);
            if is_real {
                self.set_primary_connector(&name);
            }
            return;
        }

        if self.is_fake(&new_primary) {
            debug!(old = ?old, new = %new_primary.name, "Placeholder reported as primary, keeping id 0");
            return;
        }

        info!(old = ?old, new = %new_primary.name, "Primary output changed");
        self.set_primary_connector(&new_primary.name);
    }

    /// Give `connector` ID 0, swapping ids with the previous primary.
    /// Fake outputs never hold an id, so they are refused.
    pub fn set_primary_connector(&mut self, connector: &str) {
        if self.is_fake_name(connector) || self.output_by_name(connector).is_some_and(|o| self.is_fake(o)) {
            debug!(connector = %connector, "Refusing to make a fake output primary");
            return;
        }
        if self.table.set_primary(connector) {
            info!(connector = %connector, "Primary connector now holds screen id 0");
            self.save();
        }
    }

    /// Re-classify every connected output and publish state transitions
    pub fn reconsider_outputs(&mut self) {
        let mut ordered = self.outputs.clone();
        ordered.sort_by(|a, b| a.name.cmp(&b.name).then(a.handle.cmp(&b.handle)));

        // Every real output holds an id before anything is classified or announced
        for output in &ordered {
            self.ensure_id(output);
        }

        let mut events = Vec::new();
        for output in ordered {
            let suppressed = self.is_suppressed(&output);
            match (self.states.get(&output.handle).copied(), suppressed) {
                (Some(OutputState::Redundant), false) | (None, false) => {
                    debug!(connector = %output.name, "Output not redundant anymore");
                    self.states.insert(output.handle, OutputState::Live);
                    events.push(ScreenEvent::Added(output));
                }
                (Some(OutputState::Live), true) => {
                    debug!(
                        connector = %output.name,
                        primary = ?self.reported_primary,
                        "Output became redundant"
                    );
                    self.states.insert(output.handle, OutputState::Redundant);
                    events.push(ScreenEvent::Removed(output));
                }
                (None, true) => {
                    self.states.insert(output.handle, OutputState::Redundant);
                }
                _ => trace!(connector = %output.name, "Output unchanged"),
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    /// Run whatever timers are due at `now`
    pub fn poll_timers(&mut self, now: Instant) {
        if self.reconsider_timer.fire_if_due(now) {
            self.reconsider_outputs();
        }
        if self.save_timer.fire_if_due(now) {
            if let Err(e) = self.store.sync() {
                error!(error = ?e, "Failed to write screen connector mapping");
            }
        }
    }

    /// Earliest instant at which `poll_timers` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.reconsider_timer.deadline(), self.save_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Stop all timers, flush the mapping and hand the store back
    pub fn shutdown(mut self) -> Result<S> {
        self.reconsider_timer.stop();
        self.save_timer.stop();
        self.store
            .sync()
            .context("Failed to flush screen connector mapping on shutdown")?;
        info!(screens = self.table.len(), "Screen pool shut down");
        Ok(self.store)
    }

    // ---- queries ----

    pub fn id(&self, connector: &str) -> Option<ScreenId> {
        self.table.id(connector)
    }

    /// Connector of a known id. Only ids handed out by this pool may be queried.
    pub fn connector(&self, id: ScreenId) -> Option<&str> {
        debug_assert!(self.table.contains_id(id), "connector() queried with unassigned screen id {id}");
        self.table.connector(id)
    }

    pub fn screen_for_id(&self, id: ScreenId) -> Option<&Output> {
        let connector = self.table.connector(id)?;
        self.output_by_name(connector)
    }

    pub fn screen_for_connector(&self, connector: &str) -> Option<&Output> {
        self.output_by_name(connector)
    }

    pub fn known_ids(&self) -> Vec<ScreenId> {
        self.table.known_ids()
    }

    /// Connector holding ID 0
    pub fn primary_connector(&self) -> Option<&str> {
        self.table.primary_connector()
    }

    pub fn reported_primary(&self) -> Option<&str> {
        self.reported_primary.as_deref()
    }

    /// Logical screen set, in arrival order
    pub fn screens(&self) -> impl Iterator<Item = &Output> {
        self.outputs
            .iter()
            .filter(move |o| self.states.get(&o.handle) == Some(&OutputState::Live))
    }

    /// All connected outputs, including suppressed ones
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn state(&self, handle: OutputHandle) -> Option<OutputState> {
        self.states.get(&handle).copied()
    }

    pub fn identity_table(&self) -> &IdentityTable {
        &self.table
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- internals ----

    fn output_by_name(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    fn is_fake_name(&self, name: &str) -> bool {
        name.is_empty() || self.settings.fake_output_names.iter().any(|fake| fake == name)
    }

    fn is_fake(&self, output: &Output) -> bool {
        is_output_fake(output, &self.settings.fake_output_names)
    }

    fn is_suppressed(&self, output: &Output) -> bool {
        is_output_suppressed(output, &self.outputs, &self.settings.fake_output_names, |name| {
            self.table.id(name)
        })
    }

    /// Only a single output is left and the primary is a placeholder
    fn no_real_outputs_connected(&self) -> bool {
        if self.outputs.len() > 1 {
            return false;
        }
        self.reported_primary
            .as_deref()
            .and_then(|name| self.output_by_name(name))
            .is_none_or(|primary| self.is_fake(primary))
    }

    /// Classify an output that just arrived (or re-arrived)
    fn classify_new(&mut self, output: Output) {
        let fake = self.is_fake(&output);
        let redundant = !fake && self.is_suppressed(&output);
        info!(
            connector = %output.name,
            handle = %output.handle,
            geometry = %output.geometry,
            fake,
            redundant,
            "Output added"
        );

        match self.states.get(&output.handle).copied() {
            Some(OutputState::Live) => {
                // Already visible; a later sweep demotes it if needed
            }
            _ if fake || redundant => {
                self.states.insert(output.handle, OutputState::Redundant);
            }
            _ => {
                self.states.insert(output.handle, OutputState::Live);
                self.emit(ScreenEvent::Added(output));
            }
        }
    }

    /// Give a real output its id if it has none yet, saving the new mapping
    fn ensure_id(&mut self, output: &Output) {
        if self.is_fake(output) {
            return;
        }
        let (id, assigned) = self.table.assign_or_lookup(&output.name);
        if assigned {
            info!(connector = %output.name, id, "Mapped new screen");
            self.save();
        }
    }

    fn store_matches_table(&self) -> bool {
        let persisted: BTreeMap<String, String> = self.store.read_all().into_iter().collect();
        persisted.len() == self.table.len()
            && self
                .table
                .entries()
                .all(|(id, connector)| persisted.get(&id.to_string()).map(String::as_str) == Some(connector))
    }

    /// Mirror the table into the store and make sure a sync is pending
    fn save(&mut self) {
        let expected: BTreeMap<String, String> = self
            .table
            .entries()
            .map(|(id, connector)| (id.to_string(), connector.to_string()))
            .collect();

        for (key, _) in self.store.read_all() {
            if !expected.contains_key(&key) {
                self.store.delete_entry(&key);
            }
        }
        for (key, connector) in &expected {
            self.store.write_entry(key, connector);
        }

        // Disk writes happen at most once per cooldown
        self.save_timer.start_if_idle(Instant::now());
    }

    fn emit(&mut self, event: ScreenEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
