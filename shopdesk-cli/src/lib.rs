use anyhow::anyhow;
pub use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::str::FromStr;

pub mod pretty;

/// Represents fields/content specified on the command line.
///
/// Sort of like HTTPie. Query parameters are '==', body values (JSON) are '='. Only single-level
/// body values are allowed currently, not JSON Pointer assignment.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ArgField {
    Query(String, serde_json::Value),
    Body(String, serde_json::Value),
}

impl FromStr for ArgField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref FIELD_RE: Regex = Regex::new(r"^([a-zA-Z_]+)=(=)?(.*)$").unwrap();
        }
        if let Some(captures) = FIELD_RE.captures(s) {
            let key = captures[1].to_string();
            let val =
                Value::from_str(&captures[3]).unwrap_or(Value::String(captures[3].to_string()));
            let val = match val {
                Value::String(s) if s.is_empty() => Value::Null,
                _ => val,
            };
            if captures.get(2).is_some() {
                Ok(ArgField::Query(key, val))
            } else {
                Ok(ArgField::Body(key, val))
            }
        } else {
            Err(anyhow!("could not parse as a field assignment: {}", s))
        }
    }
}

/// Query parameters, in command-line order. Strings are passed without JSON quoting.
pub fn query_from_fields(fields: &[ArgField]) -> Vec<(String, String)> {
    fields
        .iter()
        .filter_map(|f| match f {
            ArgField::Query(k, Value::String(s)) => Some((k.to_string(), s.to_string())),
            ArgField::Query(k, Value::Null) => Some((k.to_string(), String::new())),
            ArgField::Query(k, v) => Some((k.to_string(), v.to_string())),
            ArgField::Body(..) => None,
        })
        .collect()
}

/// JSON object of the body fields, or None if there are none. Later fields win.
pub fn value_from_fields(fields: Vec<ArgField>) -> Option<Value> {
    let mut map = serde_json::Map::new();
    for f in fields.into_iter() {
        if let ArgField::Body(k, v) = f {
            map.insert(k, v);
        }
    }
    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

#[test]
fn test_argfield() {
    use serde_json::json;
    assert_eq!(
        ArgField::from_str("status==new").unwrap(),
        ArgField::Query("status".to_string(), json!("new")),
    );
    assert_eq!(
        ArgField::from_str("page==2").unwrap(),
        ArgField::Query("page".to_string(), json!(2)),
    );
    assert_eq!(
        ArgField::from_str("slug=medved").unwrap(),
        ArgField::Body("slug".to_string(), json!("medved")),
    );
    assert_eq!(
        ArgField::from_str("extra_charge=1.15").unwrap(),
        ArgField::Body("extra_charge".to_string(), json!(1.15)),
    );
    assert_eq!(
        ArgField::from_str("comment=\"call after 6\"").unwrap(),
        ArgField::Body("comment".to_string(), json!("call after 6")),
    );
    assert_eq!(
        ArgField::from_str("address=").unwrap(),
        ArgField::Body("address".to_string(), Value::Null),
    );

    assert!(ArgField::from_str("medved").is_err());
    assert!(ArgField::from_str("").is_err());
    assert!(ArgField::from_str("order.id=3").is_err());
    assert!(ArgField::from_str("page2==1").is_err());
}

#[test]
fn test_fields_split() {
    use serde_json::json;
    let fields: Vec<ArgField> = ["page==2", "q==winter", "slug=medved", "extra_charge=1.2"]
        .iter()
        .map(|s| ArgField::from_str(s).unwrap())
        .collect();
    assert_eq!(
        query_from_fields(&fields),
        vec![
            ("page".to_string(), "2".to_string()),
            ("q".to_string(), "winter".to_string()),
        ]
    );
    assert_eq!(
        value_from_fields(fields),
        Some(json!({"slug": "medved", "extra_charge": 1.2}))
    );
    assert_eq!(
        value_from_fields(vec![ArgField::Query("a".to_string(), json!(1))]),
        None
    );
}
