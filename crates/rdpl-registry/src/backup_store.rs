use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rdpl_core::{Backup, BackupSet, Error, Hive, RegValue, Result, ValueType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Persists the backup set as a JSON array under the data directory.
///
/// Writes are neither locked nor atomic; one install/remove at a time is assumed.
#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupRecord {
    hive: Hive,
    key_path: String,
    value_name: String,
    value_type: ValueType,
    value: Option<RecordValue>,
    existed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_root: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RecordValue {
    Text(String),
    Integer(u64),
    Bytes(Vec<u8>),
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, backups: &BackupSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                Error::io(
                    format!("failed to create backup directory {}", parent.display()),
                    err,
                )
            })?;
        }

        let records = backups.iter().map(BackupRecord::from).collect::<Vec<_>>();
        let payload = serde_json::to_string_pretty(&records).map_err(|err| {
            Error::io(
                "failed to serialize registry backups",
                io::Error::new(io::ErrorKind::InvalidData, err),
            )
        })?;
        fs::write(&self.path, payload).map_err(|err| {
            Error::io(
                format!("failed to write backup file {}", self.path.display()),
                err,
            )
        })?;

        debug!(path = %self.path.display(), count = backups.len(), "saved registry backups");
        Ok(())
    }

    pub fn load(&self) -> Result<BackupSet> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "backup file {}",
                    self.path.display()
                )));
            }
            Err(err) => {
                return Err(Error::io(
                    format!("failed to read backup file {}", self.path.display()),
                    err,
                ));
            }
        };

        let records: Vec<BackupRecord> =
            serde_json::from_str(&raw).map_err(|err| self.parse_error(err.to_string()))?;
        let mut backups = BackupSet::new();
        for (index, record) in records.into_iter().enumerate() {
            let backup = record
                .into_backup()
                .map_err(|reason| self.parse_error(format!("record {index}: {reason}")))?;
            backups.push(backup);
        }
        Ok(backups)
    }

    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(
                format!("failed to delete backup file {}", self.path.display()),
                err,
            )),
        }
    }

    fn parse_error(&self, reason: String) -> Error {
        Error::Parse {
            path: self.path.clone(),
            reason,
        }
    }
}

impl From<&Backup> for BackupRecord {
    fn from(backup: &Backup) -> Self {
        let value = backup.original_value.as_ref().map(|value| match value {
            RegValue::String(text) | RegValue::ExpandString(text) => {
                RecordValue::Text(text.clone())
            }
            RegValue::Dword(number) => RecordValue::Integer(u64::from(*number)),
            RegValue::Qword(number) => RecordValue::Integer(*number),
            RegValue::Binary(bytes) => RecordValue::Bytes(bytes.clone()),
        });
        Self {
            hive: backup.hive,
            key_path: backup.key_path.clone(),
            value_name: backup.value_name.clone(),
            value_type: backup.value_type,
            value,
            existed: backup.existed,
            created_root: backup.created_root.clone(),
        }
    }
}

impl BackupRecord {
    fn into_backup(self) -> std::result::Result<Backup, String> {
        let original_value = match self.value {
            None => None,
            Some(value) => Some(decode_value(self.value_type, value)?),
        };
        Ok(Backup {
            hive: self.hive,
            key_path: self.key_path,
            value_name: self.value_name,
            value_type: self.value_type,
            existed: self.existed,
            original_value,
            created_root: self.created_root,
        })
    }
}

fn decode_value(value_type: ValueType, value: RecordValue) -> std::result::Result<RegValue, String> {
    match (value_type, value) {
        (ValueType::String, RecordValue::Text(text)) => Ok(RegValue::String(text)),
        (ValueType::ExpandString, RecordValue::Text(text)) => Ok(RegValue::ExpandString(text)),
        (ValueType::Dword, RecordValue::Integer(number)) => u32::try_from(number)
            .map(RegValue::Dword)
            .map_err(|_| format!("{number} does not fit in {value_type}")),
        (ValueType::Qword, RecordValue::Integer(number)) => Ok(RegValue::Qword(number)),
        (ValueType::Binary, RecordValue::Bytes(bytes)) => Ok(RegValue::Binary(bytes)),
        (value_type, _) => Err(format!("value shape does not match {value_type}")),
    }
}
