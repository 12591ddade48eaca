use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, RegValue, Result, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hive {
    #[serde(rename = "HKLM")]
    LocalMachine,
    #[serde(rename = "HKCU")]
    CurrentUser,
}

impl Hive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalMachine => "HKLM",
            Self::CurrentUser => "HKCU",
        }
    }
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry mutation the installer owns.
///
/// An empty `value_name` only guarantees that `key_path` exists; no value is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub hive: Hive,
    pub key_path: String,
    pub value_name: String,
    pub value_type: ValueType,
    pub value: RegValue,
}

impl Entry {
    pub fn value(hive: Hive, key_path: &str, value_name: &str, value: RegValue) -> Self {
        Self {
            hive,
            key_path: key_path.to_string(),
            value_name: value_name.to_string(),
            value_type: value.value_type(),
            value,
        }
    }

    pub fn key(hive: Hive, key_path: &str) -> Self {
        Self::value(hive, key_path, "", RegValue::String(String::new()))
    }

    pub fn is_key_only(&self) -> bool {
        self.value_name.is_empty()
    }

    /// The value to write, provided its variant agrees with the declared type.
    pub fn checked_value(&self) -> Result<&RegValue> {
        let actual = self.value.value_type();
        if actual != self.value_type {
            return Err(Error::TypeMismatch {
                location: self.location(),
                declared: self.value_type,
                actual,
            });
        }
        Ok(&self.value)
    }

    pub fn location(&self) -> String {
        location(self.hive, &self.key_path, &self.value_name)
    }
}

/// Pre-mutation state of one entry.
///
/// `existed` records whether the key was present. `value_type` is the kind of
/// `original_value` when there is one, so a foreign-typed value is written back as it was.
/// For a missing key, `created_root` is the outermost ancestor-or-self of `key_path` that
/// was also missing, i.e. the first key the write creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub hive: Hive,
    pub key_path: String,
    pub value_name: String,
    pub value_type: ValueType,
    pub existed: bool,
    pub original_value: Option<RegValue>,
    pub created_root: Option<String>,
}

impl Backup {
    pub fn capture(entry: &Entry, existed: bool, original_value: Option<RegValue>) -> Self {
        let value_type = original_value
            .as_ref()
            .map(RegValue::value_type)
            .unwrap_or(entry.value_type);
        Self {
            hive: entry.hive,
            key_path: entry.key_path.clone(),
            value_name: entry.value_name.clone(),
            value_type,
            existed,
            original_value,
            created_root: None,
        }
    }

    pub fn with_created_root(mut self, root: impl Into<String>) -> Self {
        self.created_root = Some(root.into());
        self
    }

    /// Keys this entry's write created, innermost first. Empty when the key existed.
    pub fn created_keys(&self) -> Vec<&str> {
        if self.existed {
            return Vec::new();
        }
        let root = match self.created_root.as_deref() {
            Some(root) if is_ancestor_or_self(root, &self.key_path) => root,
            _ => self.key_path.as_str(),
        };
        let mut keys = Vec::new();
        let mut current = self.key_path.as_str();
        loop {
            keys.push(current);
            if current.eq_ignore_ascii_case(root) {
                break;
            }
            match current.rsplit_once('\\') {
                Some((parent, _)) => current = parent,
                None => break,
            }
        }
        keys
    }

    pub fn location(&self) -> String {
        location(self.hive, &self.key_path, &self.value_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSet {
    backups: Vec<Backup>,
}

impl BackupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, backup: Backup) {
        self.backups.push(backup);
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Backup> {
        self.backups.iter()
    }

    pub fn as_slice(&self) -> &[Backup] {
        &self.backups
    }
}

impl From<Vec<Backup>> for BackupSet {
    fn from(backups: Vec<Backup>) -> Self {
        Self { backups }
    }
}

impl<'a> IntoIterator for &'a BackupSet {
    type Item = &'a Backup;
    type IntoIter = std::slice::Iter<'a, Backup>;

    fn into_iter(self) -> Self::IntoIter {
        self.backups.iter()
    }
}

fn location(hive: Hive, key_path: &str, value_name: &str) -> String {
    if value_name.is_empty() {
        format!("{hive}\\{key_path}")
    } else {
        format!("{hive}\\{key_path}\\{value_name}")
    }
}

fn is_ancestor_or_self(ancestor: &str, key_path: &str) -> bool {
    match key_path.get(..ancestor.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(ancestor) => {
            key_path.len() == ancestor.len() || key_path[ancestor.len()..].starts_with('\\')
        }
        _ => false,
    }
}
