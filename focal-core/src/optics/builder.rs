//! Optic Builders
//!
//! [`OpticBuilder<S>`] is handed to the closure passed to
//! [`focus`](crate::reactive::focus) and offers the stock optics for `S`.
//! The same foci are available as chaining methods on an existing optic, so
//! `builder.prop("a").prop("b")` reads the way the path does.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde_json::Value;

use super::{FocusError, Optic};

/// Entry point for building an optic over `S`.
pub struct OpticBuilder<S> {
    _source: PhantomData<fn() -> S>,
}

impl<S> Default for OpticBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> OpticBuilder<S> {
    /// Create a builder for optics over `S`.
    pub fn new() -> Self {
        Self {
            _source: PhantomData,
        }
    }
}

impl<S: Clone + 'static> OpticBuilder<S> {
    /// The optic that focuses the whole value.
    pub fn identity(&self) -> Optic<S, S> {
        Optic::lens(S::clone, |_, s| s)
    }

    /// A custom total lens.
    pub fn lens<A, G, F>(&self, get: G, set: F) -> Optic<S, A>
    where
        A: 'static,
        G: Fn(&S) -> A + Send + Sync + 'static,
        F: Fn(&S, A) -> S + Send + Sync + 'static,
    {
        Optic::lens(get, set)
    }

    /// A custom partial optic.
    pub fn partial<A, G, F>(&self, preview: G, set: F) -> Optic<S, A>
    where
        A: 'static,
        G: Fn(&S) -> Result<A, FocusError> + Send + Sync + 'static,
        F: Fn(&S, A) -> Result<S, FocusError> + Send + Sync + 'static,
    {
        Optic::partial(preview, set)
    }
}

impl<T: Clone + Send + Sync + 'static> OpticBuilder<Vec<T>> {
    /// Focus the element at `index`.
    pub fn index(&self, index: usize) -> Optic<Vec<T>, T> {
        Optic::partial(
            move |items: &Vec<T>| {
                items.get(index).cloned().ok_or(FocusError::IndexOutOfRange {
                    index,
                    len: items.len(),
                })
            },
            move |items: &Vec<T>, value| {
                if index >= items.len() {
                    return Err(FocusError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    });
                }
                let mut updated = items.clone();
                updated[index] = value;
                Ok(updated)
            },
        )
    }
}

impl<K, V> OpticBuilder<IndexMap<K, V>>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Focus the entry stored under `key`. Setting a missing key is a miss;
    /// the optic never grows the map.
    pub fn key(&self, key: K) -> Optic<IndexMap<K, V>, V> {
        let set_key = key.clone();
        Optic::partial(
            move |map: &IndexMap<K, V>| {
                map.get(&key)
                    .cloned()
                    .ok_or_else(|| FocusError::MissingKey(format!("{key:?}")))
            },
            move |map: &IndexMap<K, V>, value| {
                if !map.contains_key(&set_key) {
                    return Err(FocusError::MissingKey(format!("{set_key:?}")));
                }
                let mut updated = map.clone();
                updated.insert(set_key.clone(), value);
                Ok(updated)
            },
        )
    }
}

impl OpticBuilder<Value> {
    /// Focus the property `name` of a JSON object.
    ///
    /// Reading a missing property is a miss, distinct from a property that
    /// holds `null`. Setting a missing property inserts it.
    pub fn prop(&self, name: impl Into<String>) -> Optic<Value, Value> {
        let name = name.into();
        let set_name = name.clone();
        Optic::partial(
            move |value: &Value| match value {
                Value::Object(map) => map
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| FocusError::MissingKey(name.clone())),
                other => Err(shape("object", other)),
            },
            move |value: &Value, focused| match value {
                Value::Object(map) => {
                    let mut updated = map.clone();
                    updated.insert(set_name.clone(), focused);
                    Ok(Value::Object(updated))
                }
                other => Err(shape("object", other)),
            },
        )
    }

    /// Focus the element at `index` of a JSON array.
    pub fn at(&self, index: usize) -> Optic<Value, Value> {
        Optic::partial(
            move |value: &Value| match value {
                Value::Array(items) => {
                    items.get(index).cloned().ok_or(FocusError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    })
                }
                other => Err(shape("array", other)),
            },
            move |value: &Value, focused| match value {
                Value::Array(items) if index < items.len() => {
                    let mut updated = items.clone();
                    updated[index] = focused;
                    Ok(Value::Array(updated))
                }
                Value::Array(items) => Err(FocusError::IndexOutOfRange {
                    index,
                    len: items.len(),
                }),
                other => Err(shape("array", other)),
            },
        )
    }
}

fn shape(expected: &'static str, found: &Value) -> FocusError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    FocusError::Shape { expected, found }
}

impl<S: 'static> Optic<S, Value> {
    /// Continue into property `name` of the focused JSON object.
    pub fn prop(&self, name: impl Into<String>) -> Optic<S, Value> {
        self.compose(&OpticBuilder::<Value>::new().prop(name))
    }

    /// Continue into element `index` of the focused JSON array.
    pub fn at(&self, index: usize) -> Optic<S, Value> {
        self.compose(&OpticBuilder::<Value>::new().at(index))
    }
}

impl<S: 'static, T: Clone + Send + Sync + 'static> Optic<S, Vec<T>> {
    /// Continue into element `index` of the focused vector.
    pub fn index(&self, index: usize) -> Optic<S, T> {
        self.compose(&OpticBuilder::<Vec<T>>::new().index(index))
    }
}

impl<S, K, V> Optic<S, IndexMap<K, V>>
where
    S: 'static,
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Continue into the entry under `key` of the focused map.
    pub fn key(&self, key: K) -> Optic<S, V> {
        self.compose(&OpticBuilder::<IndexMap<K, V>>::new().key(key))
    }
}
