use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered list of HTTP header (name, value) pairs
///
/// On the wire this is a flat JSON object. Serialization writes the pairs in
/// list order; deserialization keeps the object's order and accepts repeated
/// names, so a header carried twice arrives twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any earlier value of the same name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name` in list order, compared case-insensitively
    pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for HeaderList {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for HeaderList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(n, v)| (n, v)))
    }
}

impl<'de> Deserialize<'de> for HeaderList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderListVisitor;

        impl<'de> Visitor<'de> for HeaderListVisitor {
            type Value = HeaderList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<HeaderList, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    pairs.push((name, value));
                }
                Ok(HeaderList(pairs))
            }
        }

        deserializer.deserialize_map(HeaderListVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_object_in_order() {
        let headers: HeaderList = [("x-b", "2"), ("x-a", "1")].into_iter().collect();
        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"x-b":"2","x-a":"1"}"#);
    }

    #[test]
    fn test_deserialize_keeps_repeated_names() {
        let json = r#"{"set-cookie":"a=1","content-type":"text/plain","set-cookie":"b=2"}"#;
        let headers: HeaderList = serde_json::from_str(json).unwrap();

        assert_eq!(headers.len(), 3);
        let cookies: Vec<_> = headers.get_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_rejects_non_string_values() {
        let result = serde_json::from_str::<HeaderList>(r#"{"x-count": 3}"#);
        assert!(result.is_err());

        let result = serde_json::from_str::<HeaderList>(r#"["x-a", "1"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup_outlives_name() {
        let headers: HeaderList = [("Content-Type", "text/plain"), ("X-Tag", "a"), ("x-tag", "b")]
            .into_iter()
            .collect();

        let value = {
            let name = String::from("content-type");
            headers.get(&name)
        };
        assert_eq!(value, Some("text/plain"));

        let tags: Vec<&str> = {
            let name = String::from("X-TAG");
            headers.get_all(&name).collect()
        };
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn test_get_missing() {
        let headers = HeaderList::new();
        assert!(headers.is_empty());
        assert_eq!(headers.get("host"), None);
    }
}
