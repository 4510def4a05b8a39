use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use commerce_core::{DomainError, ValueObject};

/// Shopper identity, issued by the external account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::validation("customer_id cannot be empty"));
        }
        Ok(Self(id.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selected product options (`size=M`, `color=red`), ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductOptions(BTreeMap<String, String>);

impl ValueObject for ProductOptions {}

impl ProductOptions {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(options: BTreeMap<String, String>) -> Self {
        Self(options)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// First name in `required` that is not selected.
    pub fn first_missing<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        required.into_iter().find(|name| !self.has_option(name))
    }
}

impl From<BTreeMap<String, String>> for ProductOptions {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self(value)
    }
}
