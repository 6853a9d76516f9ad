//! Named parameter collections and the key-preserving transform over them.
//!
//! Both map shapes iterate in sorted key order (two-key maps by outer key, then
//! inner key). The portable stream content depends on this order, so it is a
//! contract of the containers and not an incidental property.

use std::{collections::BTreeMap, convert::Infallible, fmt, marker::PhantomData};

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, MapAccess, Visitor},
};

/// A mapping from names to values that can be rebuilt with converted values.
pub trait KeyedMap {
    /// The type of the stored values.
    type Value;

    /// The same key shape holding values of type `U`.
    type With<U>: KeyedMap<Value = U>;

    /// Builds a new map with the same keys and `f` applied to every value.
    ///
    /// # Errors
    /// The first error returned by `f` aborts the transform and is returned as is.
    fn try_transform<U, E, F>(&self, f: F) -> Result<Self::With<U>, E>
    where
        F: FnMut(&Self::Value) -> Result<U, E>;

    /// Infallible form of `try_transform`.
    fn transform<U, F>(&self, mut f: F) -> Self::With<U>
    where
        F: FnMut(&Self::Value) -> U,
    {
        match self.try_transform(|value| Ok::<_, Infallible>(f(value))) {
            Ok(map) => map,
            Err(never) => match never {},
        }
    }

    /// Returns the number of stored values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mapping from a single string key to a value, iterated in key order.
///
/// Deserializing refuses an object that repeats a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct KeyMap<V>(BTreeMap<String, V>);

impl<V> KeyMap<V> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.get(key)
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<V> Default for KeyMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedMap for KeyMap<V> {
    type Value = V;
    type With<U> = KeyMap<U>;

    fn try_transform<U, E, F>(&self, mut f: F) -> Result<KeyMap<U>, E>
    where
        F: FnMut(&V) -> Result<U, E>,
    {
        let mut out = BTreeMap::new();
        for (key, value) in &self.0 {
            out.insert(key.clone(), f(value)?);
        }

        Ok(KeyMap(out))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for KeyMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<V> IntoIterator for KeyMap<V> {
    type Item = (String, V);
    type IntoIter = std::collections::btree_map::IntoIter<String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for KeyMap<V> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_map(UniqueKeys(PhantomData)).map(Self)
    }
}

/// A mapping from an `(outer, inner)` key pair to a value, iterated by outer
/// key, then inner key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TwoKeyMap<V>(BTreeMap<String, KeyMap<V>>);

impl<V> TwoKeyMap<V> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts `value` under `(outer, inner)`, returning the value it replaced.
    pub fn insert(
        &mut self,
        outer: impl Into<String>,
        inner: impl Into<String>,
        value: V,
    ) -> Option<V> {
        self.0
            .entry(outer.into())
            .or_default()
            .insert(inner, value)
    }

    pub fn get(&self, outer: &str, inner: &str) -> Option<&V> {
        self.0.get(outer)?.get(inner)
    }

    /// Iterates over the entries by outer key, then inner key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &V)> {
        self.0.iter().flat_map(|(outer, inners)| {
            inners
                .iter()
                .map(move |(inner, v)| (outer.as_str(), inner, v))
        })
    }

    /// Consumes the map into its entries, by outer key, then inner key.
    pub fn into_entries(self) -> impl Iterator<Item = (String, String, V)> {
        self.0.into_iter().flat_map(|(outer, inners)| {
            inners
                .into_iter()
                .map(move |(inner, v)| (outer.clone(), inner, v))
        })
    }

    /// Iterates over the outer keys, each with all of its inner entries.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &KeyMap<V>)> {
        self.0.iter().map(|(outer, inners)| (outer.as_str(), inners))
    }
}

impl<V> Default for TwoKeyMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedMap for TwoKeyMap<V> {
    type Value = V;
    type With<U> = TwoKeyMap<U>;

    fn try_transform<U, E, F>(&self, mut f: F) -> Result<TwoKeyMap<U>, E>
    where
        F: FnMut(&V) -> Result<U, E>,
    {
        let mut out = BTreeMap::new();
        for (outer, inners) in &self.0 {
            out.insert(outer.clone(), inners.try_transform(&mut f)?);
        }

        Ok(TwoKeyMap(out))
    }

    fn len(&self) -> usize {
        self.0.values().map(|inners| inners.len()).sum()
    }
}

impl<K1, K2, V> FromIterator<(K1, K2, V)> for TwoKeyMap<V>
where
    K1: Into<String>,
    K2: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K1, K2, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (outer, inner, value) in iter {
            map.insert(outer, inner, value);
        }
        map
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for TwoKeyMap<V> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_map(UniqueKeys(PhantomData)).map(Self)
    }
}

/// Reads a map into sorted entries, failing on the first repeated key.
struct UniqueKeys<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueKeys<V> {
    type Value = BTreeMap<String, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with unique string keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format_args!("duplicate key {key:?}")));
            }
            let value = access.next_value()?;
            map.insert(key, value);
        }

        Ok(map)
    }
}
