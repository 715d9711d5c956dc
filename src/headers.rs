use std::collections::BTreeMap;

/// A case-insensitive header mapping. Names are canonicalized to lowercase
/// on insert and lookup, per spec.md section 9 ("Headers as case-insensitive
/// mappings" — implementations should canonicalize to lowercase on read).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Overlay `other` on top of `self`, `other` winning on conflicting names.
    pub fn merged_over(mut self, other: &Headers) -> Self {
        for (k, v) in other.iter() {
            self.insert(k, v.to_string());
        }
        self
    }

    /// Remove every header named in `names` (already lowercase).
    pub fn strip(&mut self, names: &[String]) {
        for n in names {
            self.0.remove(n);
        }
    }

    /// The (name, value) pairs present with identical values in both `self`
    /// and `other`. Used to build `common_headers` across paginated
    /// responses (spec.md 4.5 step 5).
    pub fn intersect(&self, other: &Headers) -> Headers {
        let mut out = Headers::new();
        for (k, v) in self.0.iter() {
            if other.0.get(k) == Some(v) {
                out.0.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.insert(k, v);
        }
        h
    }
}
