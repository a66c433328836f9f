//! In-memory snapshot of the store

use scout_types::{UnitName, UnitRecord};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// A stored entry that could not be decoded into a [`UnitRecord`]
///
/// The raw value is kept so that saving the table writes it back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecord {
    pub raw: Value,
    pub error: String,
}

impl MalformedRecord {
    /// Host ports still readable from the raw entry
    pub fn ports(&self) -> Vec<u16> {
        ["port", "db_port"]
            .iter()
            .filter_map(|key| self.raw.get(*key))
            .filter_map(|value| match value {
                Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect()
    }
}

/// Snapshot of every unit known to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitTable {
    pub records: BTreeMap<UnitName, UnitRecord>,
    pub malformed: BTreeMap<UnitName, MalformedRecord>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every entry of a state-file object independently
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut table = Self::new();
        for (name, raw) in object {
            let unit = UnitName::new(name.as_str());
            match serde_json::from_value::<UnitRecord>(raw.clone()) {
                Ok(record) => {
                    table.records.insert(unit, record);
                }
                Err(e) => {
                    table.malformed.insert(
                        unit,
                        MalformedRecord {
                            raw: raw.clone(),
                            error: e.to_string(),
                        },
                    );
                }
            }
        }
        table
    }

    /// Encode into a state-file object, layering each record over its
    /// previous raw entry so unknown fields survive.
    pub fn to_object(&self, previous: &Map<String, Value>) -> Map<String, Value> {
        let mut object = Map::new();
        for (name, malformed) in &self.malformed {
            object.insert(name.to_string(), malformed.raw.clone());
        }
        for (name, record) in &self.records {
            let base = previous.get(name.as_str()).cloned();
            object.insert(name.to_string(), overlay(base, record));
        }
        object
    }

    pub fn insert(&mut self, name: UnitName, record: UnitRecord) {
        self.malformed.remove(&name);
        self.records.insert(name, record);
    }

    pub fn get(&self, name: &UnitName) -> Option<&UnitRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &UnitName) -> bool {
        self.records.contains_key(name) || self.malformed.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every host port claimed by a stored unit, malformed ones included
    pub fn used_ports(&self) -> HashSet<u16> {
        self.records
            .values()
            .flat_map(|r| [r.explorer_port, r.db_port])
            .chain(self.malformed.values().flat_map(MalformedRecord::ports))
            .collect()
    }
}

/// Encode `record` on top of an existing raw entry
pub(crate) fn overlay(base: Option<Value>, record: &UnitRecord) -> Value {
    let encoded = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let mut merged = match base {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in encoded {
        merged.insert(key, value);
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_types::UnitPatch;
    use serde_json::json;

    fn record(port: u16, db_port: u16) -> UnitRecord {
        UnitPatch::new()
            .explorer_port(port)
            .db_port(db_port)
            .rpc_endpoint("http://rpc")
            .into_record()
            .unwrap()
    }

    #[test]
    fn test_malformed_entries_are_isolated() {
        let object = json!({
            "alpha": {"port": 1, "db_port": 2, "endpoint": "e"},
            "beta": {"port": "not a port"}
        });
        let table = UnitTable::from_object(object.as_object().unwrap());

        assert!(table.get(&UnitName::new("alpha")).is_some());
        assert!(table.malformed.contains_key(&UnitName::new("beta")));
        assert!(table.contains(&UnitName::new("beta")));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_to_object_keeps_unknown_fields_and_malformed_raw() {
        let previous = json!({
            "alpha": {"port": 1, "db_port": 2, "endpoint": "e", "note": "keep me"},
            "beta": {"broken": true}
        });
        let previous = previous.as_object().unwrap();
        let mut table = UnitTable::from_object(previous);
        table.insert(UnitName::new("alpha"), record(10, 20));

        let object = table.to_object(previous);
        assert_eq!(object["alpha"]["port"], 10);
        assert_eq!(object["alpha"]["note"], "keep me");
        assert_eq!(object["beta"], json!({"broken": true}));
    }

    #[test]
    fn test_used_ports() {
        let mut table = UnitTable::new();
        table.insert(UnitName::new("alpha"), record(1, 2));
        table.insert(UnitName::new("beta"), record(3, 4));
        let ports = table.used_ports();
        assert_eq!(ports.len(), 4);
        assert!(ports.contains(&3));
    }

    #[test]
    fn test_used_ports_include_malformed_entries() {
        let object = json!({
            "alpha": {"port": 1, "db_port": 2, "endpoint": "e"},
            "beta": {"port": 4100, "db_port": "4101"},
            "gamma": {"port": "not a port", "db_port": 70000}
        });
        let table = UnitTable::from_object(object.as_object().unwrap());
        assert_eq!(table.malformed.len(), 2);

        let ports = table.used_ports();
        assert_eq!(ports, [1, 2, 4100, 4101].into_iter().collect());
    }
}
