use rdpl_core::{Hive, RegValue, Result};

/// What a read-only open of a key observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
    Missing,
    /// `value` is `None` when no value was asked for or the named value is absent.
    Present { value: Option<RegValue> },
}

/// Registry surface consumed by the transaction manager.
///
/// Every call acquires its key handle and releases it before returning.
pub trait RegistryBackend {
    /// Opens `key_path` read-only and, for a non-empty `value_name`, decodes the stored
    /// value in whatever kind it was written with.
    fn inspect(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<KeyState>;

    /// Creates the key and any missing parents, or opens it if present.
    fn create_key(&self, hive: Hive, key_path: &str) -> Result<()>;

    fn write_value(
        &self,
        hive: Hive,
        key_path: &str,
        value_name: &str,
        value: &RegValue,
    ) -> Result<()>;

    /// A missing key or value is not an error.
    fn delete_value(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<()>;

    /// Names of the values under `key_path`, or `None` when the key does not exist.
    fn value_names(&self, hive: Hive, key_path: &str) -> Result<Option<Vec<String>>>;

    /// Number of direct subkeys of `key_path`, or `None` when the key does not exist.
    fn subkey_count(&self, hive: Hive, key_path: &str) -> Result<Option<usize>>;

    /// A missing key is not an error.
    fn delete_key(&self, hive: Hive, key_path: &str) -> Result<()>;
}

impl<R: RegistryBackend + ?Sized> RegistryBackend for &R {
    fn inspect(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<KeyState> {
        (**self).inspect(hive, key_path, value_name)
    }

    fn create_key(&self, hive: Hive, key_path: &str) -> Result<()> {
        (**self).create_key(hive, key_path)
    }

    fn write_value(
        &self,
        hive: Hive,
        key_path: &str,
        value_name: &str,
        value: &RegValue,
    ) -> Result<()> {
        (**self).write_value(hive, key_path, value_name, value)
    }

    fn delete_value(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<()> {
        (**self).delete_value(hive, key_path, value_name)
    }

    fn value_names(&self, hive: Hive, key_path: &str) -> Result<Option<Vec<String>>> {
        (**self).value_names(hive, key_path)
    }

    fn subkey_count(&self, hive: Hive, key_path: &str) -> Result<Option<usize>> {
        (**self).subkey_count(hive, key_path)
    }

    fn delete_key(&self, hive: Hive, key_path: &str) -> Result<()> {
        (**self).delete_key(hive, key_path)
    }
}
