//! Tank extraction from branch documents
//!
//! Branches embed their tanks in `oil_tanks`. Over time that field has been
//! written as an array of tank objects and as an object keyed by tank key,
//! with both camelCase and snake_case field names. Everything that needs to
//! read or mutate an embedded tank goes through this module so the rest of
//! the engine only ever sees [`Tank`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tankwatch_common::db::{BranchRecord, OilType};
use thiserror::Error;
use tracing::warn;

use super::status::{classify_level, fill_percentage, TankStatus};

/// Display name used when an oil type cannot be resolved
pub const UNKNOWN_OIL_TYPE: &str = "Unknown Oil Type";

const OIL_TYPE_ID_FIELDS: &[&str] = &["oilTypeId", "oil_type_id", "oilType"];
const OIL_TYPE_NAME_FIELDS: &[&str] = &["oilTypeName", "oil_type_name", "name"];
const LEVEL_FIELDS: &[&str] = &["currentLevel", "current_level", "level"];
const CAPACITY_FIELDS: &[&str] = &["capacity", "maxCapacity", "max_capacity"];
const UPDATED_FIELDS: &[&str] = &["lastUpdated", "last_updated"];

/// Identity of an embedded tank: owning branch plus its key in `oil_tanks`
///
/// The key is the array index for array-shaped documents and the object key
/// otherwise. Textual form is `<branch_id>:<key>`, with `%` and `:` inside
/// either component written as `%25` and `%3A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TankId {
    pub branch_id: String,
    pub key: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid tank id '{0}': expected <branch_id>:<key>")]
pub struct TankIdParseError(pub String);

impl TankId {
    pub fn new(branch_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            branch_id: branch_id.into(),
            key: key.into(),
        }
    }
}

fn escape_component(raw: &str) -> String {
    raw.replace('%', "%25").replace(':', "%3A")
}

fn unescape_component(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.get(1..3) {
            Some(code) if code.eq_ignore_ascii_case("3A") => {
                out.push(':');
                rest = &tail[3..];
            }
            Some("25") => {
                out.push('%');
                rest = &tail[3..];
            }
            _ => {
                out.push('%');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl fmt::Display for TankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            escape_component(&self.branch_id),
            escape_component(&self.key)
        )
    }
}

impl FromStr for TankId {
    type Err = TankIdParseError;

    /// Exactly one unescaped `:` separates the components
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once(':') {
            Some((branch_id, key))
                if !branch_id.is_empty() && !key.is_empty() && !key.contains(':') =>
            {
                Ok(TankId::new(
                    unescape_component(branch_id),
                    unescape_component(key),
                ))
            }
            _ => Err(TankIdParseError(trimmed.to_string())),
        }
    }
}

impl Serialize for TankId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TankId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A tank as seen by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tank {
    pub id: TankId,
    pub branch_id: String,
    pub branch_name: String,
    pub oil_type_id: Option<String>,
    pub oil_type_name: String,
    pub current_level: f64,
    pub capacity: f64,
    pub fill_percentage: f64,
    pub status: TankStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

/// What was in an embedded tank just before [`set_embedded_level`] changed it
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedTankSnapshot {
    pub oil_type_id: Option<String>,
    pub embedded_name: Option<String>,
    pub old_level: f64,
    pub capacity: Option<f64>,
}

/// Flatten every branch's tanks into one list, branch order preserved
pub fn extract_tanks(branches: &[BranchRecord], oil_types: &[OilType]) -> Vec<Tank> {
    let names = oil_type_index(oil_types);
    branches
        .iter()
        .flat_map(|branch| extract_with_index(branch, &names))
        .collect()
}

/// Tanks of a single branch
///
/// Never fails: an absent or wrong-shaped `oil_tanks` yields no tanks, and
/// individual malformed entries are skipped.
pub fn extract_branch_tanks(branch: &BranchRecord, oil_types: &[OilType]) -> Vec<Tank> {
    extract_with_index(branch, &oil_type_index(oil_types))
}

/// Resolve an oil type display name: catalogue, then embedded copy, then unknown
pub fn resolve_oil_type_name(
    oil_type_id: Option<&str>,
    embedded_name: Option<&str>,
    oil_types: &[OilType],
) -> String {
    let from_catalogue = oil_type_id
        .and_then(|id| oil_types.iter().find(|t| t.id == id))
        .map(|t| t.name.as_str());
    pick_name(from_catalogue, embedded_name)
}

/// Replace the recorded level of one embedded tank in place
///
/// Also stamps the tank's last-updated field with `at`. Returns `None` when
/// `key` does not address a tank object in either document shape.
pub fn set_embedded_level(
    oil_tanks: &mut Value,
    key: &str,
    new_level: f64,
    at: DateTime<Utc>,
) -> Option<EmbeddedTankSnapshot> {
    let entry = match oil_tanks {
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        Value::Object(map) => map.get_mut(key),
        _ => None,
    }?;
    let obj = entry.as_object_mut()?;

    let snapshot = EmbeddedTankSnapshot {
        oil_type_id: first_string(obj, OIL_TYPE_ID_FIELDS),
        embedded_name: first_string(obj, OIL_TYPE_NAME_FIELDS),
        old_level: first_number(obj, LEVEL_FIELDS).unwrap_or(0.0),
        capacity: first_number(obj, CAPACITY_FIELDS),
    };

    let level_field = existing_field(obj, LEVEL_FIELDS).unwrap_or(LEVEL_FIELDS[0]);
    obj.insert(level_field.to_string(), Value::from(new_level));

    let updated_field = existing_field(obj, UPDATED_FIELDS).unwrap_or(UPDATED_FIELDS[0]);
    obj.insert(
        updated_field.to_string(),
        Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    Some(snapshot)
}

fn oil_type_index(oil_types: &[OilType]) -> HashMap<&str, &str> {
    oil_types
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect()
}

fn extract_with_index(branch: &BranchRecord, names: &HashMap<&str, &str>) -> Vec<Tank> {
    let Some(oil_tanks) = branch.oil_tanks.as_ref() else {
        return Vec::new();
    };

    embedded_entries(oil_tanks)
        .into_iter()
        .filter_map(|(key, value)| {
            let tank = read_embedded(branch, &key, value, names);
            if tank.is_none() {
                warn!(
                    "Skipping malformed tank '{}' in branch {} ({})",
                    key, branch.name, branch.id
                );
            }
            tank
        })
        .collect()
}

fn embedded_entries(oil_tanks: &Value) -> Vec<(String, &Value)> {
    match oil_tanks {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Object(map) => {
            let mut entries: Vec<(String, &Value)> =
                map.iter().map(|(k, v)| (k.clone(), v)).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        }
        _ => Vec::new(),
    }
}

fn read_embedded(
    branch: &BranchRecord,
    key: &str,
    value: &Value,
    names: &HashMap<&str, &str>,
) -> Option<Tank> {
    let obj = value.as_object()?;
    let capacity = first_number(obj, CAPACITY_FIELDS)?;
    let current_level = first_number(obj, LEVEL_FIELDS).unwrap_or(0.0);

    let oil_type_id = first_string(obj, OIL_TYPE_ID_FIELDS);
    let embedded_name = first_string(obj, OIL_TYPE_NAME_FIELDS);
    let from_catalogue = oil_type_id.as_deref().and_then(|id| names.get(id).copied());
    let oil_type_name = pick_name(from_catalogue, embedded_name.as_deref());

    let last_updated = UPDATED_FIELDS
        .iter()
        .filter_map(|f| obj.get(*f))
        .find_map(parse_timestamp);

    Some(Tank {
        id: TankId::new(branch.id.clone(), key),
        branch_id: branch.id.clone(),
        branch_name: branch.name.clone(),
        oil_type_id,
        oil_type_name,
        current_level,
        capacity,
        fill_percentage: fill_percentage(current_level, capacity),
        status: classify_level(current_level, capacity),
        last_updated,
    })
}

fn pick_name(from_catalogue: Option<&str>, embedded: Option<&str>) -> String {
    from_catalogue
        .filter(|n| !n.trim().is_empty())
        .or_else(|| embedded.filter(|n| !n.trim().is_empty()))
        .unwrap_or(UNKNOWN_OIL_TYPE)
        .to_string()
}

fn existing_field(obj: &Map<String, Value>, fields: &[&'static str]) -> Option<&'static str> {
    fields.iter().copied().find(|f| obj.contains_key(*f))
}

/// First of `fields` holding a number or a numeric string
fn first_number(obj: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|f| obj.get(*f))
        .find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|n| n.is_finite())
}

/// First of `fields` holding a non-empty string (numbers are stringified)
fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().filter_map(|f| obj.get(*f)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        // Epoch milliseconds
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn oil_types() -> Vec<OilType> {
        vec![
            OilType { id: "diesel".into(), name: "Diesel".into() },
            OilType { id: "petrol".into(), name: "Petrol 95".into() },
        ]
    }

    fn branch(id: &str, name: &str, oil_tanks: Option<Value>) -> BranchRecord {
        BranchRecord { id: id.into(), name: name.into(), oil_tanks }
    }

    #[test]
    fn test_array_shape_keyed_by_index() {
        let b = branch(
            "b1",
            "North",
            Some(json!([
                {"oilTypeId": "diesel", "currentLevel": 480, "capacity": 500},
                {"oilTypeId": "petrol", "currentLevel": 20, "capacity": 500}
            ])),
        );

        let tanks = extract_branch_tanks(&b, &oil_types());

        assert_eq!(tanks.len(), 2);
        assert_eq!(tanks[0].id, TankId::new("b1", "0"));
        assert_eq!(tanks[0].oil_type_name, "Diesel");
        assert_eq!(tanks[0].status, TankStatus::Full);
        assert_eq!(tanks[1].id.to_string(), "b1:1");
        assert_eq!(tanks[1].status, TankStatus::Critical);
        assert_eq!(tanks[1].branch_name, "North");
    }

    #[test]
    fn test_object_shape_keyed_by_key() {
        let b = branch(
            "b2",
            "South",
            Some(json!({
                "tankB": {"oil_type_id": "petrol", "current_level": "150", "capacity": "500"},
                "tankA": {"oilTypeId": "diesel", "level": 250, "capacity": 500}
            })),
        );

        let tanks = extract_branch_tanks(&b, &oil_types());

        let keys: Vec<&str> = tanks.iter().map(|t| t.id.key.as_str()).collect();
        assert_eq!(keys, vec!["tankA", "tankB"]);
        assert_eq!(tanks[1].current_level, 150.0);
        assert_eq!(tanks[1].status, TankStatus::Normal);
        assert_eq!(tanks[0].fill_percentage, 50.0);
    }

    #[test]
    fn test_missing_or_wrong_shape_yields_nothing() {
        let types = oil_types();
        assert!(extract_branch_tanks(&branch("b", "B", None), &types).is_empty());
        assert!(extract_branch_tanks(&branch("b", "B", Some(Value::Null)), &types).is_empty());
        assert!(extract_branch_tanks(&branch("b", "B", Some(json!("tanks"))), &types).is_empty());
        assert!(extract_branch_tanks(&branch("b", "B", Some(json!(42))), &types).is_empty());
    }

    #[test]
    fn test_malformed_entries_do_not_poison_branch() {
        let b = branch(
            "b3",
            "East",
            Some(json!([
                "not a tank",
                {"oilTypeId": "diesel"},
                {"oilTypeId": "diesel", "currentLevel": 100, "capacity": 400}
            ])),
        );

        let tanks = extract_branch_tanks(&b, &oil_types());

        assert_eq!(tanks.len(), 1);
        assert_eq!(tanks[0].id.key, "2");
    }

    #[test]
    fn test_oil_type_name_fallbacks() {
        let b = branch(
            "b4",
            "West",
            Some(json!([
                {"oilTypeId": "ghost", "oilTypeName": "Kerosene", "currentLevel": 1, "capacity": 10},
                {"oilTypeId": "ghost", "currentLevel": 1, "capacity": 10},
                {"currentLevel": 1, "capacity": 10}
            ])),
        );

        let names: Vec<String> = extract_branch_tanks(&b, &oil_types())
            .into_iter()
            .map(|t| t.oil_type_name)
            .collect();

        assert_eq!(names, vec!["Kerosene", UNKNOWN_OIL_TYPE, UNKNOWN_OIL_TYPE]);
    }

    #[test]
    fn test_missing_level_reads_as_empty() {
        let b = branch("b5", "Hub", Some(json!([{"oilTypeId": "diesel", "capacity": 300}])));
        let tanks = extract_branch_tanks(&b, &oil_types());
        assert_eq!(tanks[0].current_level, 0.0);
        assert_eq!(tanks[0].status, TankStatus::Critical);
    }

    #[test]
    fn test_last_updated_parsing() {
        let b = branch(
            "b6",
            "Port",
            Some(json!([
                {"capacity": 10, "lastUpdated": "2024-05-01T08:30:00Z"},
                {"capacity": 10, "last_updated": 1714552200000i64},
                {"capacity": 10, "lastUpdated": "yesterday"}
            ])),
        );

        let tanks = extract_branch_tanks(&b, &[]);

        let expected = DateTime::parse_from_rfc3339("2024-05-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(tanks[0].last_updated, Some(expected));
        assert_eq!(tanks[1].last_updated, Some(expected));
        assert_eq!(tanks[2].last_updated, None);
    }

    #[test]
    fn test_extract_tanks_spans_branches_in_order() {
        let branches = vec![
            branch("b1", "North", Some(json!([{"capacity": 10}]))),
            branch("b2", "South", None),
            branch("b3", "East", Some(json!({"x": {"capacity": 10}}))),
        ];

        let tanks = extract_tanks(&branches, &oil_types());

        let ids: Vec<String> = tanks.iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["b1:0", "b3:x"]);
    }

    #[test]
    fn test_tank_id_parsing() {
        assert_eq!("b1:0".parse::<TankId>().unwrap(), TankId::new("b1", "0"));
        assert!("region:7:tankA".parse::<TankId>().is_err());
        assert!("b1".parse::<TankId>().is_err());
        assert!(":0".parse::<TankId>().is_err());
        assert!("b1:".parse::<TankId>().is_err());
    }

    #[test]
    fn test_tank_id_with_colons_round_trips() {
        let id = TankId::new("region:7", "tank:A");
        assert_eq!(id.to_string(), "region%3A7:tank%3AA");
        assert_eq!(id.to_string().parse::<TankId>().unwrap(), id);

        let percent = TankId::new("b1", "50%:east");
        assert_eq!(percent.to_string(), "b1:50%25%3Aeast");
        assert_eq!(percent.to_string().parse::<TankId>().unwrap(), percent);

        assert_eq!(
            "b1:tank%3a1".parse::<TankId>().unwrap(),
            TankId::new("b1", "tank:1")
        );
    }

    #[test]
    fn test_colon_key_extracted_and_addressable() {
        let branches = vec![branch(
            "b1",
            "North",
            Some(json!({"tank:1": {"capacity": 100, "currentLevel": 10}})),
        )];

        let tanks = extract_tanks(&branches, &[]);

        assert_eq!(tanks[0].id, TankId::new("b1", "tank:1"));
        assert_eq!(tanks[0].id.to_string().parse::<TankId>().unwrap(), tanks[0].id);
    }

    #[test]
    fn test_set_embedded_level_array_shape() {
        let mut doc = json!([
            {"oilTypeId": "diesel", "currentLevel": 100, "capacity": 500}
        ]);
        let at = Utc::now();

        let snapshot = set_embedded_level(&mut doc, "0", 250.0, at).unwrap();

        assert_eq!(snapshot.old_level, 100.0);
        assert_eq!(snapshot.capacity, Some(500.0));
        assert_eq!(snapshot.oil_type_id.as_deref(), Some("diesel"));
        assert_eq!(doc[0]["currentLevel"], json!(250.0));
        assert!(doc[0]["lastUpdated"].is_string());
    }

    #[test]
    fn test_set_embedded_level_keeps_existing_field_names() {
        let mut doc = json!({
            "t1": {"oil_type_name": "Diesel", "current_level": 5, "capacity": 50, "last_updated": null}
        });

        let snapshot = set_embedded_level(&mut doc, "t1", 40.0, Utc::now()).unwrap();

        assert_eq!(snapshot.embedded_name.as_deref(), Some("Diesel"));
        assert_eq!(doc["t1"]["current_level"], json!(40.0));
        assert!(doc["t1"].get("currentLevel").is_none());
        assert!(doc["t1"]["last_updated"].is_string());
    }

    #[test]
    fn test_set_embedded_level_unknown_key() {
        let mut array_doc = json!([{"capacity": 10}]);
        assert!(set_embedded_level(&mut array_doc, "3", 1.0, Utc::now()).is_none());
        assert!(set_embedded_level(&mut array_doc, "zero", 1.0, Utc::now()).is_none());

        let mut object_doc = json!({"a": {"capacity": 10}});
        assert!(set_embedded_level(&mut object_doc, "b", 1.0, Utc::now()).is_none());
    }
}
