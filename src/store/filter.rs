//! Metadata `where` filters.
//!
//! Accepted forms:
//!
//! ```json
//! {"topic": "rust"}
//! {"year": {"$gte": 2020}}
//! {"$and": [{"topic": "rust"}, {"lang": {"$in": ["en", "fa"]}}]}
//! ```
//!
//! A record without the referenced field never matches.

use super::StoreError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Comparison {
    fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
    Field {
        key: String,
        op: Comparison,
        value: Value,
    },
}

impl MetadataFilter {
    /// Parse a `where` object. An empty object means "no filter".
    pub fn parse(value: &Value) -> Result<Option<Self>, StoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("where must be an object"))?;
        if obj.is_empty() {
            return Ok(None);
        }
        Self::parse_object(obj).map(Some)
    }

    fn parse_object(obj: &Map<String, Value>) -> Result<Self, StoreError> {
        let mut clauses = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            clauses.push(match key.as_str() {
                "$and" => Self::And(Self::parse_list(key, value)?),
                "$or" => Self::Or(Self::parse_list(key, value)?),
                k if k.starts_with('$') => {
                    return Err(invalid(format!("unknown logical operator {k}")))
                }
                _ => Self::parse_field(key, value)?,
            });
        }
        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Self::And(clauses))
        }
    }

    fn parse_list(op: &str, value: &Value) -> Result<Vec<Self>, StoreError> {
        let items = value
            .as_array()
            .ok_or_else(|| invalid(format!("{op} expects a list of filters")))?;
        items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| invalid(format!("{op} entries must be objects")))
                    .and_then(Self::parse_object)
            })
            .collect()
    }

    fn parse_field(key: &str, value: &Value) -> Result<Self, StoreError> {
        let (op, operand) = match value {
            Value::Object(inner) => {
                if inner.len() != 1 {
                    return Err(invalid(format!(
                        "field '{key}' must use exactly one operator"
                    )));
                }
                let (op_name, operand) = inner.iter().next().ok_or_else(|| {
                    invalid(format!("field '{key}' must use exactly one operator"))
                })?;
                let op = Comparison::from_operator(op_name)
                    .ok_or_else(|| invalid(format!("unknown operator {op_name}")))?;
                (op, operand.clone())
            }
            other => (Comparison::Eq, other.clone()),
        };

        match op {
            Comparison::Gt | Comparison::Gte | Comparison::Lt | Comparison::Lte
                if !operand.is_number() =>
            {
                return Err(invalid(format!("field '{key}': range operators need a number")))
            }
            Comparison::In | Comparison::Nin if !operand.is_array() => {
                return Err(invalid(format!("field '{key}': $in/$nin need a list")))
            }
            _ => {}
        }

        Ok(Self::Field {
            key: key.to_string(),
            op,
            value: operand,
        })
    }

    pub fn matches(&self, metadata: Option<&Map<String, Value>>) -> bool {
        match self {
            Self::And(all) => all.iter().all(|f| f.matches(metadata)),
            Self::Or(any) => any.iter().any(|f| f.matches(metadata)),
            Self::Field { key, op, value } => {
                let Some(actual) = metadata.and_then(|m| m.get(key)) else {
                    return false;
                };
                match op {
                    Comparison::Eq => values_equal(actual, value),
                    Comparison::Ne => !values_equal(actual, value),
                    Comparison::In => contains(value, actual),
                    Comparison::Nin => !contains(value, actual),
                    Comparison::Gt => compare(actual, value, |a, b| a > b),
                    Comparison::Gte => compare(actual, value, |a, b| a >= b),
                    Comparison::Lt => compare(actual, value, |a, b| a < b),
                    Comparison::Lte => compare(actual, value, |a, b| a <= b),
                }
            }
        }
    }
}

fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidFilter(msg.into())
}

// 1 and 1.0 compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn contains(list: &Value, item: &Value) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|v| values_equal(v, item)))
}

fn compare(actual: &Value, bound: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), bound.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn parse(v: Value) -> MetadataFilter {
        MetadataFilter::parse(&v).unwrap().unwrap()
    }

    #[test]
    fn empty_object_is_no_filter() {
        assert!(MetadataFilter::parse(&json!({})).unwrap().is_none());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(MetadataFilter::parse(&json!([1, 2])).is_err());
        assert!(MetadataFilter::parse(&json!("topic")).is_err());
    }

    #[test]
    fn bare_value_means_equality() {
        let f = parse(json!({"topic": "rust"}));
        assert!(f.matches(Some(&meta(json!({"topic": "rust"})))));
        assert!(!f.matches(Some(&meta(json!({"topic": "go"})))));
    }

    #[test]
    fn missing_field_never_matches() {
        let f = parse(json!({"topic": {"$ne": "go"}}));
        assert!(!f.matches(Some(&meta(json!({"other": 1})))));
        assert!(!f.matches(None));
    }

    #[test]
    fn integer_and_float_compare_equal() {
        let f = parse(json!({"year": 2024}));
        assert!(f.matches(Some(&meta(json!({"year": 2024.0})))));
    }

    #[test]
    fn range_operators() {
        let f = parse(json!({"year": {"$gte": 2020}}));
        assert!(f.matches(Some(&meta(json!({"year": 2020})))));
        assert!(!f.matches(Some(&meta(json!({"year": 2019})))));
        assert!(!f.matches(Some(&meta(json!({"year": "2021"})))));
    }

    #[test]
    fn membership_operators() {
        let f = parse(json!({"lang": {"$in": ["en", "fa"]}}));
        assert!(f.matches(Some(&meta(json!({"lang": "fa"})))));
        assert!(!f.matches(Some(&meta(json!({"lang": "de"})))));

        let f = parse(json!({"lang": {"$nin": ["en"]}}));
        assert!(f.matches(Some(&meta(json!({"lang": "fa"})))));
    }

    #[test]
    fn logical_combinators() {
        let f = parse(json!({"$or": [{"lang": "en"}, {"$and": [{"lang": "fa"}, {"year": {"$lt": 2000}}]}]}));
        assert!(f.matches(Some(&meta(json!({"lang": "en"})))));
        assert!(f.matches(Some(&meta(json!({"lang": "fa", "year": 1999})))));
        assert!(!f.matches(Some(&meta(json!({"lang": "fa", "year": 2001})))));
    }

    #[test]
    fn several_fields_are_implicitly_anded() {
        let f = parse(json!({"lang": "en", "topic": "rust"}));
        assert!(matches!(f, MetadataFilter::And(ref c) if c.len() == 2));
        assert!(f.matches(Some(&meta(json!({"lang": "en", "topic": "rust"})))));
        assert!(!f.matches(Some(&meta(json!({"lang": "en", "topic": "go"})))));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        for bad in [
            json!({"$not": [{"a": 1}]}),
            json!({"a": {"$regex": "x"}}),
            json!({"a": {"$gt": "x"}}),
            json!({"a": {"$in": "x"}}),
            json!({"a": {"$eq": 1, "$ne": 2}}),
            json!({"$and": {"a": 1}}),
        ] {
            assert!(MetadataFilter::parse(&bad).is_err(), "{bad} should be rejected");
        }
    }
}
