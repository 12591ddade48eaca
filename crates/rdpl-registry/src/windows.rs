use std::io;

use rdpl_core::{Error, Hive, RegValue, Result};
use winreg::enums::{
    RegType, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_ENUMERATE_SUB_KEYS, KEY_QUERY_VALUE,
    KEY_SET_VALUE, KEY_WRITE,
};
use winreg::{RegKey, RegValue as RawValue};

use crate::codec::{decode_utf16, encode_utf16};
use crate::{KeyState, RegistryBackend};

/// The host registry, through `winreg`. Key handles close when dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsRegistry;

impl WindowsRegistry {
    pub fn new() -> Self {
        Self
    }
}

fn root(hive: Hive) -> RegKey {
    RegKey::predef(match hive {
        Hive::LocalMachine => HKEY_LOCAL_MACHINE,
        Hive::CurrentUser => HKEY_CURRENT_USER,
    })
}

fn describe(hive: Hive, key_path: &str, value_name: &str) -> String {
    if value_name.is_empty() {
        format!("{hive}\\{key_path}")
    } else {
        format!("{hive}\\{key_path}\\{value_name}")
    }
}

fn classify(err: io::Error, location: String) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => Error::NotFound(location),
        io::ErrorKind::PermissionDenied => Error::Permission(location),
        _ => Error::Registry(format!("{location}: {err}")),
    }
}

fn open(hive: Hive, key_path: &str, access: u32) -> io::Result<Option<RegKey>> {
    match root(hive).open_subkey_with_flags(key_path, access) {
        Ok(key) => Ok(Some(key)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

impl RegistryBackend for WindowsRegistry {
    fn inspect(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<KeyState> {
        let location = describe(hive, key_path, value_name);
        let Some(key) =
            open(hive, key_path, KEY_QUERY_VALUE).map_err(|err| classify(err, location.clone()))?
        else {
            return Ok(KeyState::Missing);
        };
        if value_name.is_empty() {
            return Ok(KeyState::Present { value: None });
        }

        let value = match key.get_raw_value(value_name) {
            Ok(raw) => Some(decode(raw, &location)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(classify(err, location)),
        };
        Ok(KeyState::Present { value })
    }

    fn create_key(&self, hive: Hive, key_path: &str) -> Result<()> {
        root(hive)
            .create_subkey_with_flags(key_path, KEY_WRITE)
            .map(drop)
            .map_err(|err| classify(err, describe(hive, key_path, "")))
    }

    fn write_value(
        &self,
        hive: Hive,
        key_path: &str,
        value_name: &str,
        value: &RegValue,
    ) -> Result<()> {
        let location = describe(hive, key_path, value_name);
        let (key, _) = root(hive)
            .create_subkey_with_flags(key_path, KEY_SET_VALUE)
            .map_err(|err| classify(err, location.clone()))?;
        key.set_raw_value(value_name, &encode(value))
            .map_err(|err| classify(err, location))
    }

    fn delete_value(&self, hive: Hive, key_path: &str, value_name: &str) -> Result<()> {
        let location = describe(hive, key_path, value_name);
        let Some(key) =
            open(hive, key_path, KEY_SET_VALUE).map_err(|err| classify(err, location.clone()))?
        else {
            return Ok(());
        };
        match key.delete_value(value_name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(classify(err, location)),
        }
    }

    fn value_names(&self, hive: Hive, key_path: &str) -> Result<Option<Vec<String>>> {
        let location = describe(hive, key_path, "");
        let Some(key) =
            open(hive, key_path, KEY_QUERY_VALUE).map_err(|err| classify(err, location.clone()))?
        else {
            return Ok(None);
        };
        let names = key
            .enum_values()
            .map(|item| item.map(|(name, _)| name))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|err| classify(err, location))?;
        Ok(Some(names))
    }

    fn subkey_count(&self, hive: Hive, key_path: &str) -> Result<Option<usize>> {
        let location = describe(hive, key_path, "");
        let Some(key) = open(hive, key_path, KEY_ENUMERATE_SUB_KEYS)
            .map_err(|err| classify(err, location.clone()))?
        else {
            return Ok(None);
        };
        let count = key
            .enum_keys()
            .collect::<io::Result<Vec<_>>>()
            .map_err(|err| classify(err, location))?
            .len();
        Ok(Some(count))
    }

    fn delete_key(&self, hive: Hive, key_path: &str) -> Result<()> {
        match root(hive).delete_subkey(key_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(classify(err, describe(hive, key_path, ""))),
        }
    }
}

fn decode(raw: RawValue, location: &str) -> Result<RegValue> {
    let malformed = || Error::Registry(format!("{location}: malformed {:?} data", raw.vtype));
    match raw.vtype {
        RegType::REG_SZ => decode_utf16(&raw.bytes)
            .map(RegValue::String)
            .ok_or_else(malformed),
        RegType::REG_EXPAND_SZ => decode_utf16(&raw.bytes)
            .map(RegValue::ExpandString)
            .ok_or_else(malformed),
        RegType::REG_DWORD => <[u8; 4]>::try_from(raw.bytes.as_slice())
            .map(|bytes| RegValue::Dword(u32::from_le_bytes(bytes)))
            .map_err(|_| malformed()),
        RegType::REG_QWORD => <[u8; 8]>::try_from(raw.bytes.as_slice())
            .map(|bytes| RegValue::Qword(u64::from_le_bytes(bytes)))
            .map_err(|_| malformed()),
        RegType::REG_BINARY => Ok(RegValue::Binary(raw.bytes.clone())),
        ref other => Err(Error::Registry(format!(
            "{location}: cannot back up a {other:?} value"
        ))),
    }
}

fn encode(value: &RegValue) -> RawValue {
    let (bytes, vtype) = match value {
        RegValue::String(text) => (encode_utf16(text), RegType::REG_SZ),
        RegValue::ExpandString(text) => (encode_utf16(text), RegType::REG_EXPAND_SZ),
        RegValue::Dword(number) => (number.to_le_bytes().to_vec(), RegType::REG_DWORD),
        RegValue::Qword(number) => (number.to_le_bytes().to_vec(), RegType::REG_QWORD),
        RegValue::Binary(bytes) => (bytes.clone(), RegType::REG_BINARY),
    };
    RawValue { bytes, vtype }
}
