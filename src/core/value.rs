//! Configuration value tree
//!
//! Manifests, layer build configuration and override tables are all held as a
//! [`ConfigValue`] tree. Override precedence is the single recursive
//! [`ConfigValue::merge`] below:
//!
//! - maps merge key by key,
//! - scalars are replaced by the later value,
//! - lists are unioned (order kept, duplicates dropped) unless the later list
//!   is marked [`ListMode::Replace`],
//! - a type mismatch resolves to the later value.
//!
//! Merging is order-sensitive. `merge_all(b, [o1, o2])` is defined as
//! `b.merge(o1).merge(o2)`; swapping `o1` and `o2` can give a different tree.
//!
//! In TOML, a replacing list is written as a table holding only the
//! [`REPLACE_KEY`] key: `features = { "$replace" = ["alloc"] }`.

use std::collections::BTreeMap;

use crate::error::ManifestError;

/// Table key marking a list that replaces instead of unioning
pub const REPLACE_KEY: &str = "$replace";

/// Leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// How a list combines with the list it overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    /// Append items not already present
    #[default]
    Union,
    /// Discard the earlier list
    Replace,
}

/// A node in the configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Scalar(Scalar),
    List {
        items: Vec<ConfigValue>,
        mode: ListMode,
    },
    Map(BTreeMap<String, ConfigValue>),
}

impl Default for ConfigValue {
    fn default() -> Self {
        Self::empty_map()
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Boolean(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Integer(value))
    }
}

impl ConfigValue {
    /// An empty map
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// A union list of strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List {
            items: items.into_iter().map(|s| Self::from(s.into())).collect(),
            mode: ListMode::Union,
        }
    }

    /// A list that replaces whatever it is merged onto
    pub fn replacing_list(items: Vec<ConfigValue>) -> Self {
        Self::List {
            items,
            mode: ListMode::Replace,
        }
    }

    /// Borrow as a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow as a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Borrow list items
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List { items, .. } => Some(items),
            _ => None,
        }
    }

    /// String items of a list, skipping non-strings
    pub fn string_items(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Short name of the variant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(Scalar::String(_)) => "string",
            Self::Scalar(Scalar::Integer(_)) => "integer",
            Self::Scalar(Scalar::Float(_)) => "float",
            Self::Scalar(Scalar::Boolean(_)) => "boolean",
            Self::List { .. } => "list",
            Self::Map(_) => "table",
        }
    }

    /// Look up a value by key path
    pub fn get_path(&self, path: &[&str]) -> Option<&ConfigValue> {
        let mut current = self;
        for key in path {
            current = current.as_map()?.get(*key)?;
        }
        Some(current)
    }

    /// Set a value at a key path, creating (or overwriting) maps along the way
    pub fn insert_path(&mut self, path: &[&str], value: ConfigValue) {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return;
        };

        let mut current = self;
        for key in parents {
            if !matches!(current, Self::Map(_)) {
                *current = Self::empty_map();
            }
            current = match current {
                Self::Map(map) => map.entry((*key).to_string()).or_insert_with(Self::empty_map),
                _ => unreachable!("current was just made a map"),
            };
        }

        if !matches!(current, Self::Map(_)) {
            *current = Self::empty_map();
        }
        if let Self::Map(map) = current {
            map.insert((*last).to_string(), value);
        }
    }

    /// Deep-merge `over` onto `self`, returning the merged tree
    #[must_use]
    pub fn merge(&self, over: &ConfigValue) -> ConfigValue {
        match (self, over) {
            (Self::Map(base), Self::Map(over_map)) => {
                let mut merged = base.clone();
                for (key, over_value) in over_map {
                    let value = match base.get(key) {
                        Some(base_value) => base_value.merge(over_value),
                        None => over_value.settled(),
                    };
                    merged.insert(key.clone(), value);
                }
                Self::Map(merged)
            }
            (
                Self::List { items: base, .. },
                Self::List {
                    items: over_items,
                    mode: ListMode::Union,
                },
            ) => {
                let mut items = base.clone();
                for item in over_items {
                    let item = item.settled();
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
                Self::List {
                    items,
                    mode: ListMode::Union,
                }
            }
            (_, over) => over.settled(),
        }
    }

    /// Fold a sequence of overrides onto a base, in order
    #[must_use]
    pub fn merge_all(base: &ConfigValue, overrides: &[ConfigValue]) -> ConfigValue {
        overrides
            .iter()
            .fold(base.settled(), |acc, over| acc.merge(over))
    }

    /// Consume replace markers: once a replace has been applied, the list
    /// behaves like any other list for later merges.
    fn settled(&self) -> ConfigValue {
        match self {
            Self::Scalar(_) => self.clone(),
            Self::List { items, .. } => Self::List {
                items: items.iter().map(Self::settled).collect(),
                mode: ListMode::Union,
            },
            Self::Map(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.settled()))
                    .collect(),
            ),
        }
    }

    /// Convert from a parsed TOML value, recognising replace markers
    pub fn from_toml(value: &toml::Value) -> Result<Self, ManifestError> {
        Self::from_toml_at(value, "")
    }

    fn from_toml_at(value: &toml::Value, path: &str) -> Result<Self, ManifestError> {
        Ok(match value {
            toml::Value::String(s) => Self::Scalar(Scalar::String(s.clone())),
            toml::Value::Integer(i) => Self::Scalar(Scalar::Integer(*i)),
            toml::Value::Float(f) => Self::Scalar(Scalar::Float(*f)),
            toml::Value::Boolean(b) => Self::Scalar(Scalar::Boolean(*b)),
            toml::Value::Datetime(d) => Self::Scalar(Scalar::String(d.to_string())),
            toml::Value::Array(items) => Self::List {
                items: items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::from_toml_at(item, &format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
                mode: ListMode::Union,
            },
            toml::Value::Table(table) => {
                if let Some(marked) = table.get(REPLACE_KEY) {
                    if table.len() != 1 {
                        return Err(ManifestError::InvalidReplace {
                            path: path.to_string(),
                            reason: "the marker table must not contain other keys".to_string(),
                        });
                    }
                    let toml::Value::Array(items) = marked else {
                        return Err(ManifestError::InvalidReplace {
                            path: path.to_string(),
                            reason: format!("expected a list, found {}", marked.type_str()),
                        });
                    };
                    return Ok(Self::List {
                        items: items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| Self::from_toml_at(item, &format!("{path}[{i}]")))
                            .collect::<Result<_, _>>()?,
                        mode: ListMode::Replace,
                    });
                }

                let mut map = BTreeMap::new();
                for (key, item) in table {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    map.insert(key.clone(), Self::from_toml_at(item, &child)?);
                }
                Self::Map(map)
            }
        })
    }

    /// Render as a TOML value. Replace markers are not rendered.
    pub fn to_toml(&self) -> toml::Value {
        match self {
            Self::Scalar(Scalar::String(s)) => toml::Value::String(s.clone()),
            Self::Scalar(Scalar::Integer(i)) => toml::Value::Integer(*i),
            Self::Scalar(Scalar::Float(f)) => toml::Value::Float(*f),
            Self::Scalar(Scalar::Boolean(b)) => toml::Value::Boolean(*b),
            Self::List { items, .. } => {
                toml::Value::Array(items.iter().map(Self::to_toml).collect())
            }
            Self::Map(map) => toml::Value::Table(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_toml()))
                    .collect(),
            ),
        }
    }

    /// Render as JSON. Key order is sorted, so the text is canonical.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(Scalar::String(s)) => serde_json::Value::String(s.clone()),
            Self::Scalar(Scalar::Integer(i)) => serde_json::Value::from(*i),
            Self::Scalar(Scalar::Float(f)) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Scalar(Scalar::Boolean(b)) => serde_json::Value::Bool(*b),
            Self::List { items, mode } => {
                let list = serde_json::Value::Array(items.iter().map(Self::to_json).collect());
                match mode {
                    ListMode::Union => list,
                    ListMode::Replace => {
                        let mut marker = serde_json::Map::new();
                        marker.insert(REPLACE_KEY.to_string(), list);
                        serde_json::Value::Object(marker)
                    }
                }
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert any serializable value into a tree (via TOML)
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Result<Self, ManifestError> {
        let toml_value = toml::Value::try_from(value).map_err(|e| ManifestError::InvalidConfig {
            path: String::new(),
            error: e.to_string(),
        })?;
        Self::from_toml(&toml_value)
    }

    /// Deserialize the tree into a typed structure (via JSON)
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ManifestError> {
        serde_json::from_value(self.settled().to_json()).map_err(|e| {
            ManifestError::InvalidConfig {
                path: String::new(),
                error: e.to_string(),
            }
        })
    }
}
