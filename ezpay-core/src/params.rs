//! Request field maps and their `key=value&...` encoding.
//!
//! Two orderings are produced from the same [`Params`]:
//! - [`Params::encode`] keeps insertion order. This is the plaintext that gets
//!   encrypted into `PostData_`.
//! - [`Params::canonical`] sorts keys byte-wise first. This is the string the
//!   check code is hashed over.
//!
//! # Examples
//! ```rust
//! use ezpay_core::params::Params;
//!
//! let params = Params::new()
//!     .with("TotalAmt", 500)
//!     .with("BuyerName", "Jane Doe");
//! assert_eq!(params.encode(), "TotalAmt=500&BuyerName=Jane+Doe");
//! assert_eq!(params.canonical(), "BuyerName=Jane+Doe&TotalAmt=500");
//! ```
use url::form_urlencoded;

/// Scalar value of a request field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    /// Present in the map but left out of every encoding.
    Null,
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Wire representation, `None` for [`ParamValue::Null`].
    pub fn render(&self) -> Option<String> {
        match self {
            ParamValue::Text(text) => Some(text.clone()),
            ParamValue::Int(value) => Some(value.to_string()),
            ParamValue::Null => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Text(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Insertion-ordered map of request fields with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing value in place.
    /// Returns the previous value if there was one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Lay `fields` over `defaults`.
    ///
    /// Defaults keep their leading position; a field that shares a default's
    /// name overwrites that value where it stands, the rest are appended in
    /// their own order.
    pub fn merge_defaults(defaults: Params, fields: Params) -> Params {
        let mut merged = defaults;
        for (key, value) in fields.entries {
            merged.insert(key, value);
        }
        merged
    }

    /// Encode in insertion order, skipping null values.
    pub fn encode(&self) -> String {
        encode_pairs(self.iter())
    }

    /// Encode with keys sorted byte-wise ascending, skipping null values.
    pub fn canonical(&self) -> String {
        let mut sorted: Vec<(&str, &ParamValue)> = self.iter().collect();
        sorted.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
        encode_pairs(sorted.into_iter())
    }

    /// Parse a form-encoded `key=value&...` string. Later duplicates win.
    pub fn parse_query(input: &str) -> Params {
        form_urlencoded::parse(input.trim().as_bytes())
            .fold(Params::new(), |params, (key, value)| {
                params.with(key.into_owned(), value.into_owned())
            })
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Params::new(), |params, (key, value)| params.with(key, value))
    }
}

impl IntoIterator for Params {
    type Item = (String, ParamValue);
    type IntoIter = std::vec::IntoIter<(String, ParamValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn encode_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a ParamValue)>) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        let Some(rendered) = value.render() else {
            continue;
        };
        if !out.is_empty() {
            out.push('&');
        }
        push_encoded(&mut out, key);
        out.push('=');
        push_encoded(&mut out, &rendered);
    }
    out
}

// RFC 1738 escaping: `form_urlencoded` leaves `*` bare, the service expects `%2A`.
fn push_encoded(out: &mut String, input: &str) {
    for chunk in form_urlencoded::byte_serialize(input.as_bytes()) {
        if chunk.contains('*') {
            out.push_str(&chunk.replace('*', "%2A"));
        } else {
            out.push_str(chunk);
        }
    }
}
