//! JSON encoding of unit bodies.
//!
//! Finite numbers are written as JSON numbers. NaN and the infinities have no
//! JSON number form, so they are written as the strings `"NaN"`, `"Infinity"`
//! and `"-Infinity"` instead.

use std::fmt;

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};

use crate::keyed::{KeyMap, TwoKeyMap};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// A value with a JSON body encoding.
pub trait UnitBody: Sized {
    fn encode<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error>;

    fn decode<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error>;
}

/// Serializes a borrowed value through its body encoding.
pub struct Encoded<'a, T>(pub &'a T);

impl<T: UnitBody> Serialize for Encoded<'_, T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.encode(s)
    }
}

/// Deserializes an owned value through its body encoding.
pub struct Decoded<T>(pub T);

impl<'de, T: UnitBody> Deserialize<'de> for Decoded<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        T::decode(d).map(Decoded)
    }
}

impl UnitBody for f64 {
    fn encode<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match *self {
            x if x.is_finite() => s.serialize_f64(x),
            x if x.is_nan() => s.serialize_str(NAN),
            x if x > 0.0 => s.serialize_str(INFINITY),
            _ => s.serialize_str(NEG_INFINITY),
        }
    }

    fn decode<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(NumberVisitor)
    }
}

struct NumberVisitor;

impl<'de> Visitor<'de> for NumberVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a number, {NAN:?}, {INFINITY:?} or {NEG_INFINITY:?}")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        match v {
            NAN => Ok(f64::NAN),
            INFINITY => Ok(f64::INFINITY),
            NEG_INFINITY => Ok(f64::NEG_INFINITY),
            _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
        }
    }
}

impl<T: UnitBody> UnitBody for Vec<T> {
    fn encode<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(self.iter().map(Encoded))
    }

    fn decode<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let items = Vec::<Decoded<T>>::deserialize(d)?;
        Ok(items.into_iter().map(|Decoded(v)| v).collect())
    }
}

impl<V: UnitBody> UnitBody for KeyMap<V> {
    fn encode<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(self.iter().map(|(key, v)| (key, Encoded(v))))
    }

    fn decode<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let map = KeyMap::<Decoded<V>>::deserialize(d)?;
        Ok(map.into_iter().map(|(key, Decoded(v))| (key, v)).collect())
    }
}

impl<V: UnitBody> UnitBody for TwoKeyMap<V> {
    fn encode<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(self.groups().map(|(outer, inners)| (outer, Encoded(inners))))
    }

    fn decode<'de, D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let map = TwoKeyMap::<Decoded<V>>::deserialize(d)?;
        Ok(map
            .into_entries()
            .map(|(outer, inner, Decoded(v))| (outer, inner, v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PortableMatrix;

    fn encode<T: UnitBody>(value: &T) -> String {
        serde_json::to_string(&Encoded(value)).unwrap()
    }

    fn decode<T: UnitBody>(json: &str) -> serde_json::Result<T> {
        serde_json::from_str::<Decoded<T>>(json).map(|Decoded(v)| v)
    }

    #[test]
    fn non_finite_numbers_are_tagged() {
        let rows: PortableMatrix = vec![vec![1.5, f64::NAN], vec![f64::INFINITY, f64::NEG_INFINITY]];

        let json = encode(&rows);
        assert_eq!(json, r#"[[1.5,"NaN"],["Infinity","-Infinity"]]"#);

        let back: PortableMatrix = decode(&json).unwrap();
        assert_eq!(back[0][0], 1.5);
        assert!(back[0][1].is_nan());
        assert_eq!(back[1][0], f64::INFINITY);
        assert_eq!(back[1][1], f64::NEG_INFINITY);
    }

    #[test]
    fn finite_numbers_keep_their_bits() {
        let values = vec![-0.0, 5e-324, f64::MAX, f64::MIN_POSITIVE, 0.1 + 0.2];

        let back: Vec<f64> = decode(&encode(&values)).unwrap();
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back), bits(&values));
    }

    #[test]
    fn integers_are_read_as_numbers() {
        let back: Vec<f64> = decode("[1,-2]").unwrap();
        assert_eq!(back, [1.0, -2.0]);
    }

    #[test]
    fn unknown_strings_are_refused() {
        assert!(decode::<Vec<f64>>(r#"["nan"]"#).is_err());
        assert!(decode::<Vec<f64>>(r#"[null]"#).is_err());
    }

    #[test]
    fn maps_nest_by_key() {
        let map: TwoKeyMap<Vec<f64>> = [("b", "y", vec![f64::NAN]), ("a", "x", vec![2.0])]
            .into_iter()
            .collect();

        let json = encode(&map);
        assert_eq!(json, r#"{"a":{"x":[2.0]},"b":{"y":["NaN"]}}"#);

        let back: TwoKeyMap<Vec<f64>> = decode(&json).unwrap();
        assert_eq!(back.get("a", "x"), Some(&vec![2.0]));
        assert!(back.get("b", "y").unwrap()[0].is_nan());
    }

    #[test]
    fn repeated_keys_are_refused() {
        assert!(decode::<KeyMap<Vec<f64>>>(r#"{"a":[1.0],"a":[2.0]}"#).is_err());
        assert!(decode::<TwoKeyMap<Vec<f64>>>(r#"{"a":{"x":[1.0]},"a":{"y":[2.0]}}"#).is_err());
        assert!(decode::<TwoKeyMap<Vec<f64>>>(r#"{"a":{"x":[1.0],"x":[2.0]}}"#).is_err());
    }
}
