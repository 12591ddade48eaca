use std::path::{Path, PathBuf};

use crate::{Entry, Hive, RegValue, BACKUP_FILE_NAME};

pub const SERVICE_NAME: &str = "RDPLauncher";
pub const SERVICE_DESCRIPTION: &str = "Remote application launcher service";

pub const APP_KEY_PATH: &str = r"SOFTWARE\RDPLauncher";
pub const USER_KEY_PATH: &str = r"SOFTWARE\RDPLauncher\User";

const TS_ALLOW_LIST_PATH: &str =
    r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\Terminal Server\TSAppAllowList";
const TS_POLICY_PATH: &str = r"SOFTWARE\Policies\Microsoft\Windows NT\Terminal Services";
const WINLOGON_PATH: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\Winlogon";
const KEYBOARD_LAYOUT_PATH: &str = r"SYSTEM\CurrentControlSet\Control\Keyboard Layout";
const NETWORK_WINDOW_OFF_PATH: &str =
    r"SYSTEM\CurrentControlSet\Control\Network\NewNetworkWindowOff";

/// A key the installer creates for itself and may prune once it holds no values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedKey {
    pub hive: Hive,
    pub key_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub entries: Vec<Entry>,
    pub owned_keys: Vec<OwnedKey>,
    pub backup_path: PathBuf,
}

pub fn build_catalog(install_path: &str, server_port: u32, data_directory: &Path) -> Catalog {
    let entries = vec![
        Entry::value(
            Hive::LocalMachine,
            APP_KEY_PATH,
            "InstallPath",
            RegValue::String(install_path.to_string()),
        ),
        Entry::value(
            Hive::LocalMachine,
            APP_KEY_PATH,
            "ServerPort",
            RegValue::Dword(server_port),
        ),
        Entry::value(
            Hive::LocalMachine,
            APP_KEY_PATH,
            "EnableLogging",
            RegValue::Dword(1),
        ),
        // remote sessions may launch programs missing from the RemoteApp allow list
        Entry::value(
            Hive::LocalMachine,
            TS_ALLOW_LIST_PATH,
            "fDisabledAllowList",
            RegValue::Dword(1),
        ),
        Entry::value(
            Hive::LocalMachine,
            TS_POLICY_PATH,
            "fAllowUnlistedRemotePrograms",
            RegValue::Dword(1),
        ),
        Entry::value(
            Hive::LocalMachine,
            WINLOGON_PATH,
            "AutoAdminLogon",
            RegValue::String("0".to_string()),
        ),
        Entry::value(
            Hive::LocalMachine,
            KEYBOARD_LAYOUT_PATH,
            "IgnoreRemoteKeyboardLayout",
            RegValue::Dword(1),
        ),
        Entry::key(Hive::LocalMachine, NETWORK_WINDOW_OFF_PATH),
        // last-run timestamp, written by the running service
        Entry::value(
            Hive::CurrentUser,
            USER_KEY_PATH,
            "LastRun",
            RegValue::String(String::new()),
        ),
    ];

    Catalog {
        entries,
        owned_keys: vec![
            OwnedKey {
                hive: Hive::LocalMachine,
                key_path: APP_KEY_PATH.to_string(),
            },
            OwnedKey {
                hive: Hive::CurrentUser,
                key_path: USER_KEY_PATH.to_string(),
            },
        ],
        backup_path: data_directory.join(BACKUP_FILE_NAME),
    }
}
