// ==============================================================================
// parsers/nested.rs - Absent / Single / List Field Resolution
// ==============================================================================
// Description: Explicit tagged union for the 0/1/many nesting points of raw
//              annotation documents, resolved once at the relation boundary
// Author: Matt Barham
// Created: 2026-01-20
// Modified: 2026-10-16
// Version: 1.0.1
// ==============================================================================
// Shapes accepted at every nesting point:
//   missing / null        -> Nested::Absent
//   scalar or object      -> Nested::One
//   homogeneous list      -> Nested::Many   (all objects, all strings, ...)
// Anything else (mixed lists, nested lists, wrong item type) is rejected.
// ==============================================================================

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// A raw field that may be absent, hold one item, or hold a list of items
#[derive(Debug, Clone, PartialEq)]
pub enum Nested<T> {
    Absent,
    One(T),
    Many(Vec<T>),
}

/// Shape violation while resolving a nested field
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("list mixes {first} and {other} items")]
    MixedList { first: &'static str, other: &'static str },

    #[error("list item {index} is itself a list")]
    NestedList { index: usize },

    #[error("unexpected {found}: {details}")]
    UnexpectedItem { found: &'static str, details: String },
}

impl<T> Default for Nested<T> {
    fn default() -> Self {
        Nested::Absent
    }
}

impl<T> Nested<T> {
    /// Flatten into a list (Absent -> empty, One -> single item)
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Nested::Absent => Vec::new(),
            Nested::One(item) => vec![item],
            Nested::Many(items) => items,
        }
    }
}

impl<T: DeserializeOwned> Nested<T> {
    /// Resolve a raw JSON value into its explicit shape.
    ///
    /// # Arguments
    /// * `value` - The field value, `None` when the key is missing
    ///
    /// # Returns
    /// * `Ok(Nested<T>)` - Resolved shape with typed items
    /// * `Err(ShapeError)` - Mixed or nested list, or an item that is not a `T`
    pub fn resolve(value: Option<&Value>) -> Result<Self, ShapeError> {
        match value {
            None | Some(Value::Null) => Ok(Nested::Absent),
            Some(Value::Array(items)) => {
                let first = match items.first() {
                    Some(first) => kind_of(first),
                    None => return Ok(Nested::Many(Vec::new())),
                };

                let mut resolved = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if item.is_array() {
                        return Err(ShapeError::NestedList { index });
                    }
                    let kind = kind_of(item);
                    if kind != first {
                        return Err(ShapeError::MixedList { first, other: kind });
                    }
                    resolved.push(decode(item)?);
                }
                Ok(Nested::Many(resolved))
            }
            Some(item) => Ok(Nested::One(decode(item)?)),
        }
    }
}

fn decode<T: DeserializeOwned>(item: &Value) -> Result<T, ShapeError> {
    serde_json::from_value(item.clone()).map_err(|e| ShapeError::UnexpectedItem {
        found: kind_of(item),
        details: e.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Condition {
        name: String,
    }

    #[test]
    fn test_absent_and_null() {
        assert_eq!(Nested::<Condition>::resolve(None).unwrap(), Nested::Absent);
        assert_eq!(Nested::<Condition>::resolve(Some(&Value::Null)).unwrap(), Nested::Absent);
    }

    #[test]
    fn test_single_object() {
        let value = json!({"name": "Lynch syndrome"});
        let resolved = Nested::<Condition>::resolve(Some(&value)).unwrap();
        assert_eq!(
            resolved,
            Nested::One(Condition { name: "Lynch syndrome".to_string() })
        );
    }

    #[test]
    fn test_list_of_objects() {
        let value = json!([{"name": "A"}, {"name": "B"}]);
        let resolved = Nested::<Condition>::resolve(Some(&value)).unwrap();
        assert_eq!(resolved.into_vec().len(), 2);
    }

    #[test]
    fn test_string_or_list_of_strings() {
        let single = json!("BRCA1-related cancer");
        let many = json!(["syn a", "syn b"]);
        assert_eq!(
            Nested::<String>::resolve(Some(&single)).unwrap().into_vec(),
            vec!["BRCA1-related cancer".to_string()]
        );
        assert_eq!(Nested::<String>::resolve(Some(&many)).unwrap().into_vec().len(), 2);
    }

    #[test]
    fn test_mixed_list_rejected() {
        let value = json!([{"name": "A"}, "B"]);
        match Nested::<Condition>::resolve(Some(&value)).unwrap_err() {
            ShapeError::MixedList { first, other } => {
                assert_eq!(first, "object");
                assert_eq!(other, "string");
            }
            other => panic!("Expected MixedList, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_list_rejected() {
        let value = json!([[{"name": "A"}]]);
        assert_eq!(
            Nested::<Condition>::resolve(Some(&value)).unwrap_err(),
            ShapeError::NestedList { index: 0 }
        );
    }

    #[test]
    fn test_scalar_where_object_expected() {
        let value = json!(42);
        match Nested::<Condition>::resolve(Some(&value)).unwrap_err() {
            ShapeError::UnexpectedItem { found, .. } => assert_eq!(found, "number"),
            other => panic!("Expected UnexpectedItem, got {:?}", other),
        }
    }

    #[test]
    fn test_into_vec_over_shapes() {
        assert_eq!(Nested::One(7u32).into_vec(), vec![7]);
        assert_eq!(Nested::Many(vec![1u32, 2, 3]).into_vec(), vec![1, 2, 3]);
        assert!(Nested::<u32>::Absent.into_vec().is_empty());
    }

    #[test]
    fn test_identifier_value_shapes() {
        let one = json!("HP:0001627");
        let many = json!(["HP:0001627", 42]);
        assert_eq!(Nested::<Value>::resolve(Some(&one)).unwrap().into_vec().len(), 1);
        assert_eq!(
            Nested::<Value>::resolve(Some(&many)).unwrap_err(),
            ShapeError::MixedList { first: "string", other: "number" }
        );
    }
}
