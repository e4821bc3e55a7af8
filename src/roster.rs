//! In-memory attendance store operations.
//!
//! Every operation works on [`AttendanceData`] directly and reports a missing
//! month or member by returning `false`; callers decide whether to persist.

use crate::dates::{month_key, parse_date, previous_month};
use crate::models::{AttendanceData, MemberRecord, MonthRoster, OrderUpdate, UNASSIGNED_ROLE};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix that routes an attendance key into `extraAttendance`.
pub const EXTRA_PREFIX: &str = "extra";
pub const EXTRA_KEYS: [&str; 3] = ["extra1", "extra2", "extra3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceKey {
    Meeting(String),
    Extra(String),
}

impl AttendanceKey {
    /// Classifies a client supplied key; `None` for unknown extras and malformed dates.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.starts_with(EXTRA_PREFIX) {
            return EXTRA_KEYS
                .contains(&key)
                .then(|| Self::Extra(key.to_string()));
        }
        parse_date(key).map(|date| Self::Meeting(date.format("%Y-%m-%d").to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid import payload: {0}")]
pub struct ImportError(pub String);

#[derive(Debug, Deserialize)]
struct ImportedMember {
    role: Option<String>,
    attendance: Option<BTreeMap<String, Value>>,
    #[serde(rename = "extraAttendance")]
    extra_attendance: Option<BTreeMap<String, Value>>,
    order: Option<i64>,
}

/// Attendance flags are stored as exactly 0 or 1.
pub fn coerce_flag(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse().ok()?,
        Value::Bool(flag) => i64::from(*flag),
        _ => return None,
    };
    match number {
        0 => Some(0),
        1 => Some(1),
        _ => None,
    }
}

impl AttendanceData {
    pub fn roster(&self, year: i32, month: u32) -> Option<&MonthRoster> {
        self.months.get(&month_key(year, month))
    }

    fn roster_mut(&mut self, year: i32, month: u32) -> Option<&mut MonthRoster> {
        self.months.get_mut(&month_key(year, month))
    }

    /// Returns `true` when the roster was newly created.
    pub fn ensure_month(&mut self, year: i32, month: u32) -> bool {
        let key = month_key(year, month);
        if self.months.contains_key(&key) {
            return false;
        }
        self.months.insert(key, MonthRoster::new());
        true
    }

    pub fn add_member(&mut self, year: i32, month: u32, name: &str, role: &str) -> bool {
        let roster = self.months.entry(month_key(year, month)).or_default();
        if roster.contains_key(name) {
            return false;
        }
        let order = roster.len() as i64;
        roster.insert(name.to_string(), MemberRecord::new(role, order));
        true
    }

    pub fn delete_member(&mut self, year: i32, month: u32, name: &str) -> bool {
        self.roster_mut(year, month)
            .is_some_and(|roster| roster.shift_remove(name).is_some())
    }

    pub fn set_role(&mut self, year: i32, month: u32, name: &str, role: &str) -> bool {
        match self.roster_mut(year, month).and_then(|roster| roster.get_mut(name)) {
            Some(member) => {
                member.role = role.to_string();
                true
            }
            None => false,
        }
    }

    /// Applies every update whose member exists; unknown names are skipped.
    pub fn reorder(&mut self, year: i32, month: u32, orders: &[OrderUpdate]) -> bool {
        let Some(roster) = self.roster_mut(year, month) else {
            return false;
        };
        for update in orders {
            if let Some(member) = roster.get_mut(&update.name) {
                member.order = update.order;
            }
        }
        true
    }

    /// Replaces the month with the previous month's members, keeping role and
    /// order and clearing attendance. Fails when the previous month has no members.
    pub fn copy_previous_month(&mut self, year: i32, month: u32) -> bool {
        let (prev_year, prev_month) = previous_month(year, month);
        let copied: MonthRoster = match self.roster(prev_year, prev_month) {
            Some(previous) if !previous.is_empty() => previous
                .iter()
                .map(|(name, member)| {
                    (name.clone(), MemberRecord::new(member.role.clone(), member.order))
                })
                .collect(),
            _ => return false,
        };
        self.months.insert(month_key(year, month), copied);
        true
    }

    pub fn set_attendance(
        &mut self,
        year: i32,
        month: u32,
        name: &str,
        key: &AttendanceKey,
        status: u8,
    ) -> bool {
        let Some(member) = self.roster_mut(year, month).and_then(|roster| roster.get_mut(name))
        else {
            return false;
        };
        match key {
            AttendanceKey::Meeting(date) => member.attendance.insert(date.clone(), status),
            AttendanceKey::Extra(extra) => member.extra_attendance.insert(extra.clone(), status),
        };
        true
    }

    /// Swaps in a whole roster, returning its member count.
    pub fn replace_month(&mut self, year: i32, month: u32, roster: MonthRoster) -> usize {
        let count = roster.len();
        self.months.insert(month_key(year, month), roster);
        count
    }

    /// Overwrites the month with the roster found under `payload.members`.
    /// The store is untouched when the payload is rejected.
    pub fn import_month(
        &mut self,
        year: i32,
        month: u32,
        payload: &Value,
    ) -> Result<usize, ImportError> {
        let roster = parse_import(payload)?;
        Ok(self.replace_month(year, month, roster))
    }
}

/// Builds a roster from the object under `payload.members`.
///
/// Missing roles become [`UNASSIGNED_ROLE`], missing maps become empty and a
/// missing order becomes the member's position in the payload.
pub fn parse_import(payload: &Value) -> Result<MonthRoster, ImportError> {
    let members = payload
        .get("members")
        .and_then(Value::as_object)
        .ok_or_else(|| ImportError("expected an object under \"members\"".to_string()))?;

    let mut roster = MonthRoster::new();
    for (index, (name, raw)) in members.iter().enumerate() {
        let imported: ImportedMember = serde_json::from_value(raw.clone())
            .map_err(|err| ImportError(format!("member {name}: {err}")))?;
        let record = MemberRecord {
            role: imported.role.unwrap_or_else(|| UNASSIGNED_ROLE.to_string()),
            attendance: coerce_flags(name, imported.attendance)?,
            extra_attendance: coerce_flags(name, imported.extra_attendance)?,
            order: imported.order.unwrap_or(index as i64),
        };
        roster.insert(name.clone(), record);
    }
    Ok(roster)
}

fn coerce_flags(
    name: &str,
    raw: Option<BTreeMap<String, Value>>,
) -> Result<BTreeMap<String, u8>, ImportError> {
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            coerce_flag(&value)
                .map(|flag| (key.clone(), flag))
                .ok_or_else(|| ImportError(format!("member {name}: invalid value for {key}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> AttendanceData {
        let mut data = AttendanceData::default();
        assert!(data.add_member(2025, 3, "Kim", "pacer"));
        assert!(data.add_member(2025, 3, "Lee", "photo"));
        data
    }

    #[test]
    fn add_member_appends_with_next_order() {
        let mut data = seeded();
        assert!(data.add_member(2025, 3, "Park", "admin-tier"));

        let roster = data.roster(2025, 3).unwrap();
        assert_eq!(roster["Park"].order, 2);
        assert_eq!(roster["Park"].role, "admin-tier");
        assert!(roster["Park"].attendance.is_empty());
    }

    #[test]
    fn duplicate_add_leaves_roster_unchanged() {
        let mut data = seeded();
        let before = data.clone();
        assert!(!data.add_member(2025, 3, "Kim", "photo"));
        assert_eq!(data, before);
    }

    #[test]
    fn ensure_month_only_creates_once() {
        let mut data = AttendanceData::default();
        assert!(data.ensure_month(2025, 4));
        assert!(!data.ensure_month(2025, 4));
        assert!(data.roster(2025, 4).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_member_fails() {
        let mut data = seeded();
        let before = data.clone();
        assert!(!data.delete_member(2025, 3, "Nobody"));
        assert!(!data.delete_member(2024, 1, "Kim"));
        assert_eq!(data, before);

        assert!(data.delete_member(2025, 3, "Kim"));
        assert!(!data.roster(2025, 3).unwrap().contains_key("Kim"));
    }

    #[test]
    fn roster_keeps_insertion_order_across_deletes() {
        let mut data = AttendanceData::default();
        for name in ["Yun", "Kim", "Lee"] {
            assert!(data.add_member(2025, 3, name, "pacer"));
        }
        assert!(data.delete_member(2025, 3, "Kim"));
        assert!(data.add_member(2025, 3, "Ahn", "pacer"));

        let names: Vec<&str> = data.roster(2025, 3).unwrap().keys().map(String::as_str).collect();
        assert_eq!(names, ["Yun", "Lee", "Ahn"]);
    }

    #[test]
    fn set_role_requires_existing_member() {
        let mut data = seeded();
        assert!(data.set_role(2025, 3, "Lee", "pacer-gangnam"));
        assert_eq!(data.roster(2025, 3).unwrap()["Lee"].role, "pacer-gangnam");
        assert!(!data.set_role(2025, 3, "Nobody", "pacer"));
        assert!(!data.set_role(2025, 5, "Lee", "pacer"));
    }

    #[test]
    fn reorder_skips_unknown_names() {
        let mut data = seeded();
        let orders = vec![
            OrderUpdate { name: "Lee".into(), order: 0 },
            OrderUpdate { name: "Kim".into(), order: 5 },
            OrderUpdate { name: "Ghost".into(), order: 1 },
        ];
        assert!(data.reorder(2025, 3, &orders));

        let roster = data.roster(2025, 3).unwrap();
        assert_eq!(roster["Lee"].order, 0);
        assert_eq!(roster["Kim"].order, 5);
        assert!(!roster.contains_key("Ghost"));

        assert!(!data.reorder(2025, 9, &orders));
    }

    #[test]
    fn copy_previous_month_rolls_over_december() {
        let mut data = AttendanceData::default();
        data.add_member(2024, 12, "Kim", "pacer");
        data.set_attendance(
            2024,
            12,
            "Kim",
            &AttendanceKey::Meeting("2024-12-02".into()),
            1,
        );
        data.add_member(2025, 1, "Stale", "photo");

        assert!(data.copy_previous_month(2025, 1));
        let roster = data.roster(2025, 1).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster["Kim"].role, "pacer");
        assert_eq!(roster["Kim"].order, 0);
        assert!(roster["Kim"].attendance.is_empty());
    }

    #[test]
    fn copy_previous_month_without_source_fails() {
        let mut data = AttendanceData::default();
        data.add_member(2025, 1, "Kim", "pacer");
        let before = data.clone();
        assert!(!data.copy_previous_month(2025, 1));
        assert_eq!(data, before);
    }

    #[test]
    fn attendance_keys_route_to_the_right_map() {
        assert_eq!(
            AttendanceKey::parse("2025-03-05"),
            Some(AttendanceKey::Meeting("2025-03-05".into()))
        );
        assert_eq!(
            AttendanceKey::parse("extra2"),
            Some(AttendanceKey::Extra("extra2".into()))
        );
        assert_eq!(AttendanceKey::parse("extra9"), None);
        assert_eq!(AttendanceKey::parse("yesterday"), None);

        let mut data = seeded();
        assert!(data.set_attendance(2025, 3, "Kim", &AttendanceKey::Extra("extra1".into()), 1));
        assert!(!data.set_attendance(2025, 3, "Nobody", &AttendanceKey::Extra("extra1".into()), 1));
        let kim = &data.roster(2025, 3).unwrap()["Kim"];
        assert_eq!(kim.extra_attendance["extra1"], 1);
        assert!(kim.attendance.is_empty());
    }

    #[test]
    fn string_and_numeric_flags_coerce_identically() {
        assert_eq!(coerce_flag(&json!("1")), coerce_flag(&json!(1)));
        assert_eq!(coerce_flag(&json!(0)), Some(0));
        assert_eq!(coerce_flag(&json!(true)), Some(1));
        assert_eq!(coerce_flag(&json!(2)), None);
        assert_eq!(coerce_flag(&json!("yes")), None);
    }

    #[test]
    fn import_defaults_missing_fields() {
        let mut data = seeded();
        let payload = json!({
            "members": {
                "Zed": { "role": "pacer", "attendance": { "2025-03-03": "1" } },
                "Amy": {},
                "Bob": { "order": 9, "extraAttendance": { "extra1": 1 } }
            }
        });

        assert_eq!(data.import_month(2025, 3, &payload), Ok(3));
        let roster = data.roster(2025, 3).unwrap();
        assert_eq!(roster.len(), 3);
        assert!(!roster.contains_key("Kim"));
        assert_eq!(roster["Zed"].order, 0);
        assert_eq!(roster["Zed"].attendance["2025-03-03"], 1);
        assert_eq!(roster["Amy"].role, UNASSIGNED_ROLE);
        assert_eq!(roster["Amy"].order, 1);
        assert_eq!(roster["Bob"].order, 9);
        assert_eq!(roster["Bob"].extra_attendance["extra1"], 1);
        let names: Vec<&str> = roster.keys().map(String::as_str).collect();
        assert_eq!(names, ["Zed", "Amy", "Bob"]);
    }

    #[test]
    fn import_rejects_malformed_payloads() {
        let mut data = seeded();
        let before = data.clone();
        assert!(data.import_month(2025, 3, &json!({ "people": [] })).is_err());
        assert!(data
            .import_month(2025, 3, &json!({ "members": { "Kim": { "order": "first" } } }))
            .is_err());
        assert!(data
            .import_month(2025, 3, &json!({ "members": { "Kim": { "attendance": { "2025-03-03": 4 } } } }))
            .is_err());
        assert_eq!(data, before);
    }

    #[test]
    fn parse_import_checks_every_member_before_building() {
        let payload = json!({
            "members": {
                "Kim": { "role": "pacer" },
                "Lee": { "extraAttendance": { "extra1": "maybe" } }
            }
        });
        let err = parse_import(&payload).unwrap_err();
        assert!(err.to_string().contains("Lee"));
    }
}
