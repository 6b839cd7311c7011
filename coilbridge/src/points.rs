//! The I/O table: the registry binding symbolic point names to
//! device addresses. Built once from a device entry at startup and
//! immutable for the process lifetime; both dispatch paths route
//! through it.

use std::collections::BTreeMap;

use crate::config::DeviceEntry;

/// Whether a point is read from or written to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Declared data type of a point.
///
/// Only `digital` and `analog` are meaningful to the dispatch paths;
/// other labels are kept verbatim and rejected when written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointKind {
    Digital,
    Analog,
    Other(String),
}

impl PointKind {
    /// Map a configuration type label to a kind, keeping unknown labels.
    pub fn from_label(label: &str) -> Self {
        match label {
            "digital" => PointKind::Digital,
            "analog" => PointKind::Analog,
            other => PointKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PointKind::Digital => "digital",
            PointKind::Analog => "analog",
            PointKind::Other(label) => label,
        }
    }
}

/// A single named I/O point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoPoint {
    pub direction: Direction,
    pub kind: PointKind,
    pub address: u16,
}

/// Flat `name -> point` registry for one device.
///
/// Multiple names may alias one address; that is left as declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoTable {
    points: BTreeMap<String, IoPoint>,
}

impl IoTable {
    /// Build the table from a device entry.
    ///
    /// All `input` entries are inserted first, then all `output` entries;
    /// a name declared twice keeps its last insertion. Within each
    /// section, type groups and names are visited in key order, so
    /// construction is deterministic for a given entry.
    pub fn build(entry: &DeviceEntry) -> Self {
        let mut points = BTreeMap::new();

        for (label, group) in &entry.input {
            for (name, address) in group {
                points.insert(
                    name.clone(),
                    IoPoint {
                        direction: Direction::Input,
                        kind: PointKind::from_label(label),
                        address: *address,
                    },
                );
            }
        }

        for (label, group) in &entry.output {
            for (name, address) in group {
                points.insert(
                    name.clone(),
                    IoPoint {
                        direction: Direction::Output,
                        kind: PointKind::from_label(label),
                        address: *address,
                    },
                );
            }
        }

        Self { points }
    }

    /// Look up a point by name.
    pub fn get(&self, name: &str) -> Option<&IoPoint> {
        self.points.get(name)
    }

    /// Number of distinct point names.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate points in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IoPoint)> {
        self.points.iter()
    }

    /// Declared point names, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.points.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(input: &str, output: &str) -> DeviceEntry {
        let json = format!(
            r#"{{
                "address": "192.168.1.10",
                "port": 502,
                "publish_frequency": 1.0,
                "input": {},
                "output": {}
            }}"#,
            input, output
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_build_flattens_sections() {
        let table = IoTable::build(&entry(
            r#"{"digital": {"running": 0, "fault": 1}, "analog": {"temperature": 3}}"#,
            r#"{"digital": {"start": 4}}"#,
        ));

        assert_eq!(table.len(), 4);

        let running = table.get("running").unwrap();
        assert_eq!(running.direction, Direction::Input);
        assert_eq!(running.kind, PointKind::Digital);
        assert_eq!(running.address, 0);

        let temperature = table.get("temperature").unwrap();
        assert_eq!(temperature.kind, PointKind::Analog);

        let start = table.get("start").unwrap();
        assert_eq!(start.direction, Direction::Output);
        assert_eq!(start.address, 4);
    }

    #[test]
    fn test_output_overwrites_input_on_duplicate_name() {
        let table = IoTable::build(&entry(
            r#"{"digital": {"a": 1}}"#,
            r#"{"digital": {"a": 2}}"#,
        ));

        assert_eq!(table.len(), 1);
        let point = table.get("a").unwrap();
        assert_eq!(point.direction, Direction::Output);
        assert_eq!(point.kind, PointKind::Digital);
        assert_eq!(point.address, 2);
    }

    #[test]
    fn test_duplicate_within_section_keeps_last() {
        // "analog" sorts before "digital", so the digital declaration wins
        let table = IoTable::build(&entry(
            r#"{"analog": {"a": 1}, "digital": {"a": 2}}"#,
            r#"{}"#,
        ));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a").unwrap().kind, PointKind::Digital);
        assert_eq!(table.get("a").unwrap().address, 2);
    }

    #[test]
    fn test_address_aliasing_preserved() {
        let table = IoTable::build(&entry(
            r#"{"digital": {"a": 7, "b": 7}}"#,
            r#"{}"#,
        ));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a").unwrap().address, 7);
        assert_eq!(table.get("b").unwrap().address, 7);
    }

    #[test]
    fn test_free_form_label_stored() {
        let table = IoTable::build(&entry(
            r#"{}"#,
            r#"{"string_register": {"label": 9}}"#,
        ));

        let point = table.get("label").unwrap();
        assert_eq!(point.kind, PointKind::Other("string_register".to_string()));
        assert_eq!(point.kind.as_str(), "string_register");
    }

    #[test]
    fn test_construction_is_deterministic() {
        let e = entry(
            r#"{"digital": {"a": 1, "b": 2}, "analog": {"c": 3}}"#,
            r#"{"digital": {"a": 4, "d": 5}}"#,
        );

        assert_eq!(IoTable::build(&e), IoTable::build(&e));
    }

    #[test]
    fn test_names_enumeration() {
        let table = IoTable::build(&entry(
            r#"{"digital": {"b": 0}}"#,
            r#"{"digital": {"a": 1}}"#,
        ));

        assert_eq!(table.names(), vec!["a", "b"]);
    }
}
