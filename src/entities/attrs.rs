//! Node property storage.
//!
//! Every graph node carries an `Attrs` bag. Writing a value that differs from
//! the stored one is a property change and dirties the node; rewriting the same
//! value is not.
//!
//! `hash_all()` hashes keys in sorted order so two bags with equal contents
//! hash equally regardless of insertion order. Floats hash via `to_bits`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Str(String),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl Hash for AttrValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use AttrValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Bool(v) => v.hash(state),
            Str(v) => v.hash(state),
            Int(v) => v.hash(state),
            UInt(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Vec3(arr) => arr.iter().for_each(|f| f.to_bits().hash(state)),
            Vec4(arr) => arr.iter().for_each(|f| f.to_bits().hash(state)),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<[f32; 4]> for AttrValue {
    fn from(v: [f32; 4]) -> Self {
        AttrValue::Vec4(v)
    }
}

/// Attribute container: string key -> typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(default)]
    map: HashMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. Returns true if the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) -> bool {
        let key = key.into();
        if self.map.get(&key) == Some(&value) {
            return false;
        }
        self.map.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.map.get(key) {
            Some(AttrValue::UInt(v)) => Some(*v),
            _ => None,
        }
    }

    /// Float value; `Int` values are widened.
    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.map.get(key) {
            Some(AttrValue::Float(v)) => Some(*v),
            Some(AttrValue::Int(v)) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_vec4(&self, key: &str) -> Option<[f32; 4]> {
        match self.map.get(key) {
            Some(AttrValue::Vec4(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i32_or(&self, key: &str, default: i32) -> i32 {
        self.get_i32(key).unwrap_or(default)
    }

    pub fn get_float_or(&self, key: &str, default: f32) -> f32 {
        self.get_float(key).unwrap_or(default)
    }

    /// Remove attribute by key
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Order-independent content hash.
    pub fn hash_all(&self) -> u64 {
        let mut keys: Vec<&String> = self.map.keys().collect();
        keys.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for key in keys {
            key.hash(&mut hasher);
            if let Some(val) = self.map.get(key) {
                val.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change() {
        let mut attrs = Attrs::new();
        assert!(attrs.set("gain", AttrValue::Float(2.0)));
        assert!(!attrs.set("gain", AttrValue::Float(2.0)));
        assert!(attrs.set("gain", AttrValue::Float(3.0)));
        assert_eq!(attrs.get_float("gain"), Some(3.0));
    }

    #[test]
    fn test_typed_getters() {
        let mut attrs = Attrs::new();
        attrs.set("offset", AttrValue::Int(5));
        attrs.set("color", AttrValue::Vec4([1.0, 0.0, 0.0, 1.0]));
        attrs.set("name", "bg".into());

        assert_eq!(attrs.get_i32("offset"), Some(5));
        assert_eq!(attrs.get_float("offset"), Some(5.0));
        assert_eq!(attrs.get_vec4("color"), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(attrs.get_str("name"), Some("bg"));
        assert_eq!(attrs.get_str("offset"), None);
        assert_eq!(attrs.get_float_or("missing", 0.5), 0.5);
    }

    #[test]
    fn test_hash_order_independent() {
        let mut a = Attrs::new();
        a.set("x", AttrValue::Int(1));
        a.set("y", AttrValue::Float(2.0));
        let mut b = Attrs::new();
        b.set("y", AttrValue::Float(2.0));
        b.set("x", AttrValue::Int(1));
        assert_eq!(a.hash_all(), b.hash_all());

        b.set("x", AttrValue::Int(3));
        assert_ne!(a.hash_all(), b.hash_all());
    }
}
