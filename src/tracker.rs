//! Per-unit device state: observed coil/register values plus
//! communication counters, keyed by (port, unit ID).
//!
//! The tracker is a cheaply cloneable handle. The map takes a read-write
//! lock only to find or insert a unit entry; each unit then has its own
//! lock, so snapshot readers never block writers on unrelated units.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct DeviceState {
    pub port: String,
    pub unit_id: u8,
    pub baudrate: u32,
    pub last_updated: SystemTime,
    pub coils: BTreeMap<u16, bool>,
    pub discrete_inputs: BTreeMap<u16, bool>,
    pub holding_registers: BTreeMap<u16, u16>,
    pub input_registers: BTreeMap<u16, u16>,
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub crc_errors: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<SystemTime>,
}

impl DeviceState {
    fn new(port: &str, unit_id: u8, baudrate: u32) -> Self {
        Self {
            port: port.to_string(),
            unit_id,
            baudrate,
            last_updated: SystemTime::now(),
            coils: BTreeMap::new(),
            discrete_inputs: BTreeMap::new(),
            holding_registers: BTreeMap::new(),
            input_registers: BTreeMap::new(),
            requests: 0,
            successes: 0,
            errors: 0,
            timeouts: 0,
            crc_errors: 0,
            last_error: None,
            last_error_time: None,
        }
    }
}

/// Point-in-time copy of one unit's state, shaped for JSON export.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub unit_id: u8,
    pub port: String,
    pub baudrate: u32,
    pub last_updated: f64,
    pub coils: BTreeMap<String, bool>,
    pub discrete_inputs: BTreeMap<String, bool>,
    pub holding_registers: BTreeMap<String, u16>,
    pub input_registers: BTreeMap<String, u16>,
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub timeout_count: u64,
    pub crc_error_count: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<f64>,
}

impl DeviceSnapshot {
    fn from_state(state: &DeviceState) -> Self {
        fn stringify<V: Copy>(map: &BTreeMap<u16, V>) -> BTreeMap<String, V> {
            map.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        }

        Self {
            unit_id: state.unit_id,
            port: state.port.clone(),
            baudrate: state.baudrate,
            last_updated: epoch_seconds(state.last_updated),
            coils: stringify(&state.coils),
            discrete_inputs: stringify(&state.discrete_inputs),
            holding_registers: stringify(&state.holding_registers),
            input_registers: stringify(&state.input_registers),
            request_count: state.requests,
            success_count: state.successes,
            error_count: state.errors,
            timeout_count: state.timeouts,
            crc_error_count: state.crc_errors,
            last_error: state.last_error.clone(),
            last_error_time: state.last_error_time.map(epoch_seconds),
        }
    }
}

fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

type UnitKey = (String, u8);

/// Shared registry of per-unit device state.
#[derive(Clone, Default)]
pub struct StateTracker {
    units: Arc<RwLock<HashMap<UnitKey, Arc<Mutex<DeviceState>>>>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn unit(&self, port: &str, unit_id: u8, baudrate: u32) -> Arc<Mutex<DeviceState>> {
        if let Some(existing) = self
            .units
            .read()
            .expect("tracker lock poisoned")
            .get(&(port.to_string(), unit_id))
        {
            return Arc::clone(existing);
        }

        let mut units = self.units.write().expect("tracker lock poisoned");
        Arc::clone(
            units
                .entry((port.to_string(), unit_id))
                .or_insert_with(|| Arc::new(Mutex::new(DeviceState::new(port, unit_id, baudrate)))),
        )
    }

    fn with_unit<F>(&self, port: &str, unit_id: u8, baudrate: u32, mutate: F)
    where
        F: FnOnce(&mut DeviceState),
    {
        let unit = self.unit(port, unit_id, baudrate);
        let mut state = unit.lock().expect("unit lock poisoned");
        mutate(&mut state);
    }

    pub fn record_request(&self, port: &str, unit_id: u8, baudrate: u32) {
        self.with_unit(port, unit_id, baudrate, |state| {
            state.requests = state.requests.saturating_add(1);
        });
    }

    pub fn record_success(&self, port: &str, unit_id: u8, baudrate: u32) {
        self.with_unit(port, unit_id, baudrate, |state| {
            state.successes = state.successes.saturating_add(1);
            state.last_updated = SystemTime::now();
        });
    }

    pub fn record_error(
        &self,
        port: &str,
        unit_id: u8,
        baudrate: u32,
        message: &str,
        timed_out: bool,
    ) {
        self.with_unit(port, unit_id, baudrate, |state| {
            state.errors = state.errors.saturating_add(1);
            if timed_out {
                state.timeouts = state.timeouts.saturating_add(1);
            }
            state.last_error = Some(message.to_string());
            state.last_error_time = Some(SystemTime::now());
        });
    }

    pub fn record_crc_bypass(&self, port: &str, unit_id: u8, baudrate: u32) {
        self.with_unit(port, unit_id, baudrate, |state| {
            state.crc_errors = state.crc_errors.saturating_add(1);
        });
    }

    pub fn record_coils(&self, port: &str, unit_id: u8, baudrate: u32, address: u16, values: &[bool]) {
        self.with_unit(port, unit_id, baudrate, |state| {
            for (offset, value) in values.iter().enumerate() {
                state.coils.insert(address + offset as u16, *value);
            }
            state.last_updated = SystemTime::now();
        });
    }

    pub fn record_discrete_inputs(
        &self,
        port: &str,
        unit_id: u8,
        baudrate: u32,
        address: u16,
        values: &[bool],
    ) {
        self.with_unit(port, unit_id, baudrate, |state| {
            for (offset, value) in values.iter().enumerate() {
                state.discrete_inputs.insert(address + offset as u16, *value);
            }
            state.last_updated = SystemTime::now();
        });
    }

    pub fn record_holding_registers(
        &self,
        port: &str,
        unit_id: u8,
        baudrate: u32,
        address: u16,
        values: &[u16],
    ) {
        self.with_unit(port, unit_id, baudrate, |state| {
            for (offset, value) in values.iter().enumerate() {
                state.holding_registers.insert(address + offset as u16, *value);
            }
            state.last_updated = SystemTime::now();
        });
    }

    pub fn record_input_registers(
        &self,
        port: &str,
        unit_id: u8,
        baudrate: u32,
        address: u16,
        values: &[u16],
    ) {
        self.with_unit(port, unit_id, baudrate, |state| {
            for (offset, value) in values.iter().enumerate() {
                state.input_registers.insert(address + offset as u16, *value);
            }
            state.last_updated = SystemTime::now();
        });
    }

    /// Point-in-time copy for one unit, `None` if it was never seen.
    pub fn snapshot(&self, port: &str, unit_id: u8) -> Option<DeviceSnapshot> {
        let unit = Arc::clone(
            self.units
                .read()
                .expect("tracker lock poisoned")
                .get(&(port.to_string(), unit_id))?,
        );
        let state = unit.lock().expect("unit lock poisoned");
        Some(DeviceSnapshot::from_state(&state))
    }

    /// Point-in-time copies of every tracked unit, ordered by key.
    pub fn snapshot_all(&self) -> Vec<DeviceSnapshot> {
        let units: Vec<_> = {
            let map = self.units.read().expect("tracker lock poisoned");
            let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };

        units
            .into_iter()
            .map(|(_, unit)| {
                let state = unit.lock().expect("unit lock poisoned");
                DeviceSnapshot::from_state(&state)
            })
            .collect()
    }

    /// Drops one unit's accumulated state. Returns whether it existed.
    pub fn reset(&self, port: &str, unit_id: u8) -> bool {
        self.units
            .write()
            .expect("tracker lock poisoned")
            .remove(&(port.to_string(), unit_id))
            .is_some()
    }

    pub fn reset_all(&self) {
        self.units.write().expect("tracker lock poisoned").clear();
    }
}
