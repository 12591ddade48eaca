use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use rdpl_core::{Error, Hive, RegValue, Result};

use crate::{KeyState, RegistryBackend};

type KeyId = (Hive, String);

/// Registry held in memory, with case-insensitive key paths like the real one.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: RefCell<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    keys: BTreeMap<KeyId, BTreeMap<String, RegValue>>,
    denied: BTreeSet<KeyId>,
}

fn key_id(hive: Hive, key_path: &str) -> KeyId {
    (hive, key_path.trim_matches('\\').to_ascii_lowercase())
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value, creating its key.
    pub fn set(&self, hive: Hive, key_path: &str, value_name: &str, value: RegValue) {
        let mut state = self.state.borrow_mut();
        state.create(hive, key_path);
        state
            .keys
            .entry(key_id(hive, key_path))
            .or_default()
            .insert(value_name.to_string(), value);
    }

    pub fn get(&self, hive: Hive, key_path: &str, value_name: &str) -> Option<RegValue> {
        self.state
            .borrow()
            .keys
            .get(&key_id(hive, key_path))
            .and_then(|values| values.get(value_name).cloned())
    }

    pub fn has_key(&self, hive: Hive, key_path: &str) -> bool {
        self.state
            .borrow()
            .keys
            .contains_key(&key_id(hive, key_path))
    }

    /// Makes every mutation under `key_path` fail with a permission error.
    pub fn deny_writes(&self, hive: Hive, key_path: &str) {
        self.state
            .borrow_mut()
            .denied
            .insert(key_id(hive, key_path));
    }

    pub fn key_count(&self) -> usize {
        self.state.borrow().keys.len()
    }

    fn check_writable(&self, hive: Hive, key_path: &str) -> Result<()> {
        if self.state.borrow().denied.contains(&key_id(hive, key_path)) {
            return Err(Error::Permission(format!("{hive}\\{key_path}")));
        }
        Ok(())
    }
}

impl MemoryState {
    fn create(&mut self, hive: Hive, key_path: &str) {
        let mut prefix = String::new();
        for segment in key_path.trim_matches('\\').split('\\') {
            if !prefix.is_empty() {
                prefix.push('\\');
            }
            prefix.push_str(segment);
            self.keys.entry(key_id(hive, &prefix)).or_default();
        }
    }

    fn child_count(&self, id: &KeyId) -> usize {
        let child_prefix = format!("{}\\", id.1);
        self.keys
            .keys()
            .filter(|(hive, path)| {
                *hive == id.0
                    && path
                        .strip_prefix(&child_prefix)
                        .is_some_and(|rest| !rest.contains('\\'))
            })
            .count()
    }
}

impl RegistryBackend for MemoryRegistry {
    fn inspect(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<KeyState> {
        let state = self.state.borrow();
        let Some(values) = state.keys.get(&key_id(hive, key_path)) else {
            return Ok(KeyState::Missing);
        };
        let value = if value_name.is_empty() {
            None
        } else {
            values.get(value_name).cloned()
        };
        Ok(KeyState::Present { value })
    }

    fn create_key(&self, hive: Hive, key_path: &str) -> Result<()> {
        if !self.has_key(hive, key_path) {
            self.check_writable(hive, key_path)?;
        }
        self.state.borrow_mut().create(hive, key_path);
        Ok(())
    }

    fn write_value(
        &self,
        hive: Hive,
        key_path: &str,
        value_name: &str,
        value: &RegValue,
    ) -> Result<()> {
        self.check_writable(hive, key_path)?;
        let mut state = self.state.borrow_mut();
        let values = state
            .keys
            .get_mut(&key_id(hive, key_path))
            .ok_or_else(|| Error::NotFound(format!("{hive}\\{key_path}")))?;
        values.insert(value_name.to_string(), value.clone());
        Ok(())
    }

    fn delete_value(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<()> {
        if !self.has_key(hive, key_path) {
            return Ok(());
        }
        self.check_writable(hive, key_path)?;
        if let Some(values) = self
            .state
            .borrow_mut()
            .keys
            .get_mut(&key_id(hive, key_path))
        {
            values.remove(value_name);
        }
        Ok(())
    }

    fn value_names(&self, hive: Hive, key_path: &str) -> Result<Option<Vec<String>>> {
        Ok(self
            .state
            .borrow()
            .keys
            .get(&key_id(hive, key_path))
            .map(|values| values.keys().cloned().collect()))
    }

    fn subkey_count(&self, hive: Hive, key_path: &str) -> Result<Option<usize>> {
        let state = self.state.borrow();
        let id = key_id(hive, key_path);
        Ok(state
            .keys
            .contains_key(&id)
            .then(|| state.child_count(&id)))
    }

    fn delete_key(&self, hive: Hive, key_path: &str) -> Result<()> {
        let id = key_id(hive, key_path);
        if !self.has_key(hive, key_path) {
            return Ok(());
        }
        self.check_writable(hive, key_path)?;
        let mut state = self.state.borrow_mut();
        if state.child_count(&id) > 0 {
            return Err(Error::Registry(format!(
                "{hive}\\{key_path} still has subkeys"
            )));
        }
        state.keys.remove(&id);
        Ok(())
    }
}
