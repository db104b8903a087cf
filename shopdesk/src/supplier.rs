use crate::models::value_text;
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Suppliers whose imports are managed from the bot, as `(slug, display name)`.
pub const KNOWN_SUPPLIERS: &[(&str, &str)] = &[
    ("tochki", "4 точки"),
    ("brineks", "Бринекс"),
    ("medved", "Медведь"),
    ("shininvest", "Шининвест"),
];

pub fn supplier_name(slug: &str) -> Option<&'static str> {
    KNOWN_SUPPLIERS
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, name)| *name)
}

/// Markup multiplier applied to a supplier's purchase prices. Never below 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize)]
#[serde(transparent)]
pub struct ExtraCharge(f64);

impl ExtraCharge {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl FromStr for ExtraCharge {
    type Err = anyhow::Error;

    /// Accepts digits with an optional fractional part, using either '.' or ',' as the decimal
    /// separator: "1", "1.1", "1,25".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref CHARGE_RE: Regex = Regex::new(r"^\d+(\.\d+|,\d+)?$").unwrap();
        }
        let s = s.trim();
        if !CHARGE_RE.is_match(s) {
            return Err(anyhow!(
                "not a valid extra charge: {:?} (expected a number such as 1.1 or 1,1)",
                s
            ));
        }
        let val: f64 = s.replace(',', ".").parse()?;
        if !val.is_finite() {
            return Err(anyhow!("extra charge is out of range: {}", s));
        }
        if val < 1.0 {
            return Err(anyhow!("extra charge must be at least 1, got {}", val));
        }
        Ok(ExtraCharge(val))
    }
}

impl fmt::Display for ExtraCharge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskStatus {
    pub last_status: Option<String>,
    pub last_run_time: Option<String>,
}

/// Lenient view of a `supplier_import` response: `supplier_data {name, extra_charge}` and
/// `task_results {tire, disk}`. Absent fields stay None.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportStatus {
    pub supplier_name: Option<String>,
    pub extra_charge: Option<String>,
    pub tire: TaskStatus,
    pub disk: TaskStatus,
}

fn text_field(val: &Value) -> Option<String> {
    match val {
        Value::Null => None,
        other => Some(value_text(other)),
    }
}

fn task_status(val: &Value) -> TaskStatus {
    TaskStatus {
        last_status: text_field(&val["last_status"]),
        last_run_time: text_field(&val["last_run_time"]),
    }
}

impl ImportStatus {
    pub fn from_value(val: &Value) -> Self {
        let supplier = &val["supplier_data"];
        let tasks = &val["task_results"];
        ImportStatus {
            supplier_name: text_field(&supplier["name"]),
            extra_charge: text_field(&supplier["extra_charge"]),
            tire: task_status(&tasks["tire"]),
            disk: task_status(&tasks["disk"]),
        }
    }
}

#[test]
fn test_extra_charge() {
    assert_eq!(ExtraCharge::from_str("1").unwrap().value(), 1.0);
    assert_eq!(ExtraCharge::from_str("1.1").unwrap().value(), 1.1);
    assert_eq!(ExtraCharge::from_str("1,25").unwrap().value(), 1.25);
    assert_eq!(ExtraCharge::from_str(" 2.5 ").unwrap().value(), 2.5);

    assert!(ExtraCharge::from_str("0.9").is_err());
    assert!(ExtraCharge::from_str("0").is_err());
    assert!(ExtraCharge::from_str("-1.5").is_err());
    assert!(ExtraCharge::from_str("1.").is_err());
    assert!(ExtraCharge::from_str("1.2.3").is_err());
    assert!(ExtraCharge::from_str("abc").is_err());
    assert!(ExtraCharge::from_str("").is_err());

    let huge = "9".repeat(400);
    assert!(ExtraCharge::from_str(&huge).is_err());
    assert!(ExtraCharge::from_str(&format!("{},5", huge)).is_err());
}

#[test]
fn test_supplier_name() {
    assert_eq!(supplier_name("medved"), Some("Медведь"));
    assert_eq!(supplier_name("unknown"), None);
}

#[test]
fn test_import_status() {
    use serde_json::json;
    let status = ImportStatus::from_value(&json!({
        "supplier_data": {"name": "Медведь", "extra_charge": 1.15},
        "task_results": {
            "tire": {"last_status": "SUCCESS", "last_run_time": "2026-10-17T03:00:00Z"},
            "disk": {},
        }
    }));
    assert_eq!(status.supplier_name.as_deref(), Some("Медведь"));
    assert_eq!(status.extra_charge.as_deref(), Some("1.15"));
    assert_eq!(status.tire.last_status.as_deref(), Some("SUCCESS"));
    assert_eq!(status.disk, TaskStatus::default());

    assert_eq!(ImportStatus::from_value(&json!({})), ImportStatus::default());
}
