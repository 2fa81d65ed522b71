//! Directory records and their condensed text form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One agency row returned by the directory service, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    fields: BTreeMap<String, String>,
}

impl DirectoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Field value; absent and blank fields are both `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One line summary:
    /// `Name: .. | Address: .. | Phone: .. | Email: .. | URL: .. | Description: ..`
    pub fn condense(&self) -> String {
        let address = format!(
            "{}, {}, {} {}",
            self.get("Address1").unwrap_or(""),
            self.get("City").unwrap_or(""),
            self.get("StateCode").unwrap_or(""),
            self.get("ZipCode").unwrap_or("")
        );
        let address = address.trim_matches(|c| c == ',' || c == ' ');

        format!(
            "Name: {} | Address: {} | Phone: {} | Email: {} | URL: {} | Description: {}",
            self.get("Name").unwrap_or("N/A"),
            address,
            self.get("O_Phone").unwrap_or("N/A"),
            self.get("EMailAdd").unwrap_or("N/A"),
            self.get("URL").unwrap_or("N/A"),
            self.get("Description").unwrap_or("No description available"),
        )
    }
}

/// Condense a record set to one line per record, newline-separated.
/// Empty input yields an empty string.
pub fn condense(records: &[DirectoryRecord]) -> String {
    records
        .iter()
        .map(DirectoryRecord::condense)
        .collect::<Vec<_>>()
        .join("\n")
}
