//! Values exchanged across the channel boundary.
//!
//! [`Value`] is a closed tagged union. The base variants map one-to-one onto
//! the standard wire tags; the three platform composites
//! ([`ResourceLocator`], [`AttributeSet`], [`TypedAttributeMap`]) are layered
//! on top by the extended codec.

use std::collections::btree_map;
use std::collections::hash_map::{DefaultHasher, RandomState};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

/// A value that can cross the channel boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// Arbitrary precision integer as signed hexadecimal text (`-1f`, `ff00`).
    BigInt(String),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float64Array(Vec<f64>),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Mapping with unique keys.
    Map(ValueMap),
    /// Fixed-size array of boxed objects.
    ///
    /// The standard codec has no tag for it; the extended codec writes it as
    /// a [`Value::List`].
    ObjectArray(Vec<Value>),
    /// Encode-only identifier of an external resource.
    ResourceLocator(ResourceLocator),
    /// Encode-only attribute set of a single addressable entity.
    AttributeSet(AttributeSet),
    /// String-keyed map of explicitly typed primitives. Round-trips.
    TypedMap(TypedAttributeMap),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::BigInt(_) => "bigint",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Int32Array(_) => "int32 array",
            Value::Int64Array(_) => "int64 array",
            Value::Float64Array(_) => "float64 array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::ObjectArray(_) => "object array",
            Value::ResourceLocator(_) => "resource locator",
            Value::AttributeSet(_) => "attribute set",
            Value::TypedMap(_) => "typed attribute map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view that accepts both widths.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_typed_map(&self) -> Option<&TypedAttributeMap> {
        match self {
            Value::TypedMap(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Value::Map(v)
    }
}

impl From<ResourceLocator> for Value {
    fn from(v: ResourceLocator) -> Self {
        Value::ResourceLocator(v)
    }
}

impl From<AttributeSet> for Value {
    fn from(v: AttributeSet) -> Self {
        Value::AttributeSet(v)
    }
}

impl From<TypedAttributeMap> for Value {
    fn from(v: TypedAttributeMap) -> Self {
        Value::TypedMap(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Mapping with unique keys.
///
/// Entries keep insertion order, which is also the order they are written in.
/// Equality ignores order. Lookups go through a hash index over the keys.
#[derive(Clone, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
    index: HashMap<u64, Vec<usize>>,
    hasher: RandomState,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            hasher: RandomState::new(),
        }
    }

    /// Insert an entry, returning the previous value if the key was present.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let hash = self.key_hash(|state| hash_value(&key, state));
        if let Some(pos) = self.position(hash, |k| *k == key) {
            return Some(std::mem::replace(&mut self.entries[pos].1, value));
        }
        let pos = self.entries.len();
        self.index.entry(hash).or_default().push(pos);
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = self.key_hash(|state| hash_value(key, state));
        self.position(hash, |k| k == key)
            .map(|pos| &self.entries[pos].1)
    }

    /// Lookup by string key.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        let hash = self.key_hash(|state| hash_str(key, state));
        self.position(hash, |k| k.as_str() == Some(key))
            .map(|pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_str(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    fn key_hash(&self, write: impl FnOnce(&mut DefaultHasher)) -> u64 {
        let mut state = self.hasher.build_hasher();
        write(&mut state);
        state.finish()
    }

    fn position(&self, hash: u64, matches: impl Fn(&Value) -> bool) -> Option<usize> {
        self.index
            .get(&hash)?
            .iter()
            .copied()
            .find(|&pos| matches(&self.entries[pos].0))
    }
}

impl fmt::Debug for ValueMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Hashes `value` so that equal values always hash alike.
///
/// Floats hash their bit pattern with `-0.0` folded onto `0.0`. Nested maps
/// combine their entry hashes without regard to order.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(v) => v.hash(state),
        Value::Int32(v) => v.hash(state),
        Value::Int64(v) => v.hash(state),
        Value::BigInt(v) | Value::String(v) => v.hash(state),
        Value::Float64(v) => f64_bits(*v).hash(state),
        Value::Bytes(v) => v.hash(state),
        Value::Int32Array(v) => v.hash(state),
        Value::Int64Array(v) => v.hash(state),
        Value::Float64Array(v) => {
            v.len().hash(state);
            for item in v {
                f64_bits(*item).hash(state);
            }
        }
        Value::List(items) | Value::ObjectArray(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Map(map) => {
            map.len().hash(state);
            let combined = map.iter().fold(0u64, |acc, (k, v)| {
                let mut entry = DefaultHasher::new();
                hash_value(k, &mut entry);
                hash_value(v, &mut entry);
                acc.wrapping_add(entry.finish())
            });
            combined.hash(state);
        }
        Value::ResourceLocator(v) => v.as_str().hash(state),
        Value::AttributeSet(set) => {
            set.len().hash(state);
            for (k, v) in set.iter() {
                k.hash(state);
                hash_value(v, state);
            }
        }
        Value::TypedMap(map) => {
            map.len().hash(state);
            for (k, v) in map.iter() {
                k.hash(state);
                hash_typed(v, state);
            }
        }
    }
}

/// Same hash as `Value::String(key)` without building one.
fn hash_str<H: Hasher>(key: &str, state: &mut H) {
    std::mem::discriminant(&Value::String(String::new())).hash(state);
    key.hash(state);
}

fn hash_typed<H: Hasher>(value: &TypedValue, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        TypedValue::Null => {}
        TypedValue::String(v) => v.hash(state),
        TypedValue::Byte(v) => v.hash(state),
        TypedValue::Short(v) => v.hash(state),
        TypedValue::Int(v) => v.hash(state),
        TypedValue::Long(v) => v.hash(state),
        TypedValue::Float(v) => {
            let bits = if *v == 0.0 { 0 } else { v.to_bits() };
            bits.hash(state);
        }
        TypedValue::Double(v) => f64_bits(*v).hash(state),
        TypedValue::Bool(v) => v.hash(state),
        TypedValue::Bytes(v) => v.hash(state),
    }
}

fn f64_bits(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for ValueMap {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// String-backed identifier of an external resource (`content://authority/path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceLocator {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

impl From<String> for ResourceLocator {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// Heterogeneous attributes of one addressable entity.
///
/// Values may nest further attribute sets and typed maps. Keys iterate in
/// sorted order so the encoded layout is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    entries: BTreeMap<String, Value>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Primitive stored in a [`TypedAttributeMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    String(String),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    /// Written widened to a 64-bit float, narrowed again on read.
    Float(f32),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl TypedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            TypedValue::Null => "null",
            TypedValue::String(_) => "string",
            TypedValue::Byte(_) => "byte",
            TypedValue::Short(_) => "short",
            TypedValue::Int(_) => "int",
            TypedValue::Long(_) => "long",
            TypedValue::Float(_) => "float",
            TypedValue::Double(_) => "double",
            TypedValue::Bool(_) => "bool",
            TypedValue::Bytes(_) => "bytes",
        }
    }
}

macro_rules! typed_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for TypedValue {
                fn from(v: $ty) -> Self {
                    TypedValue::$variant(v)
                }
            }
        )*
    };
}

typed_from! {
    String => String,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    bool => Bool,
    Vec<u8> => Bytes,
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::String(v.to_string())
    }
}

impl<T: Into<TypedValue>> From<Option<T>> for TypedValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(TypedValue::Null, Into::into)
    }
}

/// String-keyed map of explicitly typed primitives.
///
/// This is the only platform composite that survives a decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedAttributeMap {
    entries: BTreeMap<String, TypedValue>,
}

impl TypedAttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<TypedValue>,
    ) -> Option<TypedValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn insert_null(&mut self, key: impl Into<String>) -> Option<TypedValue> {
        self.entries.insert(key.into(), TypedValue::Null)
    }

    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TypedValue> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, TypedValue> {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<TypedValue>> FromIterator<(K, V)> for TypedAttributeMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for TypedAttributeMap {
    type Item = (String, TypedValue);
    type IntoIter = btree_map::IntoIter<String, TypedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
