mod catalog;
mod config;
mod error;
mod model;
mod value;

pub use catalog::{
    build_catalog, Catalog, OwnedKey, APP_KEY_PATH, SERVICE_DESCRIPTION, SERVICE_NAME,
    USER_KEY_PATH,
};
pub use config::{Environment, ServiceConfig, BACKUP_FILE_NAME};
pub use error::{Error, Result};
pub use model::{Backup, BackupSet, Entry, Hive};
pub use value::{RegValue, ValueType};
