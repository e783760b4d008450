use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Arguments passed to an operator function.
///
/// Keys keep the case they were first inserted with but are looked up
/// case-insensitively. Every key can carry several values; insertion order
/// of keys is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionArguments {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl FunctionArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments with a single key/value pair
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut args = Self::new();
        args.insert(key, value);
        args
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(&key.to_lowercase()).copied()
    }

    pub fn has(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key)
            .and_then(|i| self.entries[i].1.first())
            .map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        match self.position(key) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    /// All values of `key` joined with ","
    pub fn get_joined(&self, key: &str) -> Option<String> {
        self.position(key).map(|i| self.entries[i].1.join(","))
    }

    /// The case the key was first stored with
    pub fn original_case(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.entries[i].0.as_str())
    }

    /// Replaces all values of `key`
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = values,
            None => {
                self.index.insert(key.to_lowercase(), self.entries.len());
                self.entries.push((key, values));
            }
        }
    }

    /// Replaces all values of `key` with a single value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, vec![value.into()]);
    }

    /// Adds a value to `key`, keeping the existing ones
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.set(key, vec![value.into()]),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        let pos = self.index.remove(&key.to_lowercase())?;
        let (_, values) = self.entries.remove(pos);
        for idx in self.index.values_mut() {
            if *idx > pos {
                *idx -= 1;
            }
        }
        Some(values)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over keys (original case) and their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Original-case keys with values joined by ","
    pub fn joined_map(&self) -> BTreeMap<String, String> {
        self.iter().map(|(k, v)| (k.to_string(), v.join(","))).collect()
    }

    /// Lower-case keys with values joined by ","
    pub fn lowercase_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_lowercase(), v.join(",")))
            .collect()
    }

    /// Original-case keys with only their first value
    pub fn first_values_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .filter_map(|(k, v)| v.first().map(|first| (k.to_string(), first.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FunctionArguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.append(k, v);
        }
        args
    }
}

impl fmt::Display for FunctionArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v.join(","))?;
        }
        write!(f, "}}")
    }
}

impl Serialize for FunctionArguments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            if v.len() == 1 {
                map.serialize_entry(k, &v[0])?;
            } else {
                map.serialize_entry(k, v)?;
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

struct ArgumentsVisitor;

impl<'de> Visitor<'de> for ArgumentsVisitor {
    type Value = FunctionArguments;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of strings or string arrays")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut args = FunctionArguments::new();
        while let Some((key, value)) = access.next_entry::<String, OneOrMany>()? {
            match value {
                OneOrMany::One(v) => args.append(key, v),
                OneOrMany::Many(vs) => {
                    for v in vs {
                        args.append(key.clone(), v);
                    }
                }
            }
        }
        Ok(args)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FunctionArguments::new())
    }
}

impl<'de> Deserialize<'de> for FunctionArguments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ArgumentsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_keeps_first_case() {
        let mut args = FunctionArguments::single("OutPut", "a");
        args.insert("output", "b");
        assert_eq!(args.get("OUTPUT"), Some("b"));
        assert_eq!(args.original_case("output"), Some("OutPut"));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut args: FunctionArguments = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        assert_eq!(args.remove("A"), Some(vec!["1".to_string()]));
        assert_eq!(args.get("c"), Some("3"));
        assert_eq!(args.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn deserializes_strings_and_arrays() {
        let args: FunctionArguments =
            serde_json::from_str(r#"{"tag": ["a", "b"], "Name": "x"}"#).unwrap();
        assert_eq!(args.get_all("tag"), &["a".to_string(), "b".to_string()]);
        assert_eq!(args.get_joined("name").as_deref(), Some("x"));
        let back = serde_json::to_string(&args).unwrap();
        assert_eq!(back, r#"{"tag":["a","b"],"Name":"x"}"#);
    }
}
