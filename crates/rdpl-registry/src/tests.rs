use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rdpl_core::{
    build_catalog, Backup, BackupSet, Catalog, Entry, Error, Hive, RegValue, ValueType,
    APP_KEY_PATH, USER_KEY_PATH,
};

use super::*;

const WINLOGON: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\Winlogon";
const TS_POLICY: &str = r"SOFTWARE\Policies\Microsoft\Windows NT\Terminal Services";

fn test_dir() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "rdpl-registry-tests-{}-{nanos}-{seq}",
        std::process::id()
    ))
}

fn test_catalog(data_dir: &Path) -> Catalog {
    build_catalog(r"C:\App", 8085, data_dir)
}

fn sample_entries(count: usize) -> Vec<Entry> {
    (1..=count)
        .map(|index| {
            Entry::value(
                Hive::LocalMachine,
                &format!(r"SOFTWARE\Sample\Key{index}"),
                "Value",
                RegValue::Dword(index as u32),
            )
        })
        .collect()
}

#[test]
fn apply_on_clean_registry_records_nothing_existed() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    let outcome = manager.apply_all();
    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    assert_eq!(outcome.backups.len(), 9);
    assert!(outcome.backups.iter().all(|backup| !backup.existed));
    assert!(outcome
        .backups
        .iter()
        .all(|backup| backup.original_value.is_none()));
    assert!(manager.backup_store().exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn server_port_is_written_then_removed() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    assert!(manager.apply_all().error.is_none());
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "ServerPort"),
        Some(RegValue::Dword(8085))
    );

    manager.remove_all().expect("remove must succeed");
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "ServerPort"),
        None
    );
    assert!(!registry.has_key(Hive::LocalMachine, APP_KEY_PATH));
    assert!(!registry.has_key(Hive::CurrentUser, USER_KEY_PATH));
    assert!(!manager.backup_store().exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn restore_puts_back_existing_value_exactly() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        WINLOGON,
        "AutoAdminLogon",
        RegValue::String("1".to_string()),
    );
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    let outcome = manager.apply_all();
    assert!(outcome.error.is_none());
    assert_eq!(
        registry.get(Hive::LocalMachine, WINLOGON, "AutoAdminLogon"),
        Some(RegValue::String("0".to_string()))
    );

    manager
        .restore(&outcome.backups)
        .expect("restore must succeed");
    assert_eq!(
        registry.get(Hive::LocalMachine, WINLOGON, "AutoAdminLogon"),
        Some(RegValue::String("1".to_string()))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn restore_keeps_foreign_value_kind() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        WINLOGON,
        "AutoAdminLogon",
        RegValue::Binary(vec![0xde, 0xad]),
    );
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    let outcome = manager.apply_all();
    let backup = outcome
        .backups
        .iter()
        .find(|backup| backup.value_name == "AutoAdminLogon")
        .expect("winlogon backup");
    assert_eq!(backup.value_type, ValueType::Binary);

    manager.remove_all().expect("remove must succeed");
    assert_eq!(
        registry.get(Hive::LocalMachine, WINLOGON, "AutoAdminLogon"),
        Some(RegValue::Binary(vec![0xde, 0xad]))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn restore_deletes_only_added_value_from_existing_key() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        WINLOGON,
        "Shell",
        RegValue::String("explorer.exe".to_string()),
    );
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    let outcome = manager.apply_all();
    let backup = outcome
        .backups
        .iter()
        .find(|backup| backup.value_name == "AutoAdminLogon")
        .expect("winlogon backup");
    assert!(backup.existed);
    assert!(backup.original_value.is_none());

    manager
        .restore(&outcome.backups)
        .expect("restore must succeed");
    assert_eq!(
        registry.get(Hive::LocalMachine, WINLOGON, "AutoAdminLogon"),
        None
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, WINLOGON, "Shell"),
        Some(RegValue::String("explorer.exe".to_string()))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn partial_failure_still_persists_remaining_backups() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.deny_writes(Hive::LocalMachine, r"SOFTWARE\Sample\Key3");
    let manager = RegistryManager::new(&registry, test_catalog(&dir));
    let entries = sample_entries(8);

    let outcome = manager.apply_entries(&entries);
    let err = outcome.error.expect("entry 3 must fail");
    assert_eq!(err.failure_count(), 1);
    match &err {
        Error::Aggregate { failures, .. } => {
            assert!(matches!(failures[0], Error::Permission(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    let kept = outcome
        .backups
        .iter()
        .map(|backup| backup.key_path.clone())
        .collect::<Vec<_>>();
    assert_eq!(kept.len(), 7);
    assert!(!kept.iter().any(|path| path.ends_with("Key3")));

    let persisted = manager.backup_store().load().expect("backups persisted");
    assert_eq!(persisted, outcome.backups);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn type_mismatch_is_reported_without_aborting() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    let mut entries = sample_entries(3);
    entries[0].value_type = ValueType::String;

    let outcome = manager.apply_entries(&entries);
    match outcome.error {
        Some(Error::Aggregate { ref failures, .. }) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(failures[0], Error::TypeMismatch { .. }));
        }
        ref other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(outcome.backups.len(), 2);
    assert!(!registry.has_key(Hive::LocalMachine, r"SOFTWARE\Sample\Key1"));
    assert_eq!(
        registry.get(Hive::LocalMachine, r"SOFTWARE\Sample\Key2", "Value"),
        Some(RegValue::Dword(2))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn remove_all_twice_degrades_to_best_effort() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    assert!(manager.apply_all().error.is_none());
    manager.remove_all().expect("first remove");
    assert!(!manager.backup_store().exists());
    manager
        .remove_all()
        .expect("second remove without backup must not fail");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn remove_without_backup_deletes_catalog_values() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        APP_KEY_PATH,
        "ServerPort",
        RegValue::Dword(8085),
    );
    registry.set(
        Hive::LocalMachine,
        TS_POLICY,
        "fAllowUnlistedRemotePrograms",
        RegValue::Dword(1),
    );
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    manager.remove_all().expect("best-effort removal");
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "ServerPort"),
        None
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, TS_POLICY, "fAllowUnlistedRemotePrograms"),
        None
    );
    assert!(!registry.has_key(Hive::LocalMachine, APP_KEY_PATH));
}

#[test]
fn owned_key_with_foreign_values_is_not_pruned() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        APP_KEY_PATH,
        "Channel",
        RegValue::String("beta".to_string()),
    );
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    assert!(manager.apply_all().error.is_none());
    manager.remove_all().expect("remove must succeed");

    assert!(registry.has_key(Hive::LocalMachine, APP_KEY_PATH));
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "Channel"),
        Some(RegValue::String("beta".to_string()))
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "InstallPath"),
        None
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn key_only_entry_is_removed_only_when_install_created_it() {
    let dir = test_dir();
    let key_path = r"SYSTEM\CurrentControlSet\Control\Network\NewNetworkWindowOff";

    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));
    assert!(manager.apply_all().error.is_none());
    assert!(registry.has_key(Hive::LocalMachine, key_path));
    manager.remove_all().expect("remove must succeed");
    assert!(!registry.has_key(Hive::LocalMachine, key_path));

    let seeded = MemoryRegistry::new();
    seeded.set(Hive::LocalMachine, key_path, "Marker", RegValue::Dword(1));
    let manager = RegistryManager::new(&seeded, test_catalog(&dir.join("seeded")));
    assert!(manager.apply_all().error.is_none());
    manager.remove_all().expect("remove must succeed");
    assert!(seeded.has_key(Hive::LocalMachine, key_path));
    assert_eq!(
        seeded.get(Hive::LocalMachine, key_path, "Marker"),
        Some(RegValue::Dword(1))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn remove_all_deletes_every_key_install_created() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    assert!(manager.apply_all().error.is_none());
    assert!(registry.key_count() > 0);

    manager.remove_all().expect("remove must succeed");
    assert_eq!(registry.key_count(), 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn created_keys_stop_at_preexisting_ancestor() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        r"SOFTWARE\Policies",
        "Keep",
        RegValue::Dword(1),
    );
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    let outcome = manager.apply_all();
    assert!(outcome.error.is_none());
    let policy = outcome
        .backups
        .iter()
        .find(|backup| backup.key_path == TS_POLICY)
        .expect("terminal services backup");
    assert_eq!(
        policy.created_root.as_deref(),
        Some(r"SOFTWARE\Policies\Microsoft")
    );

    manager.remove_all().expect("remove must succeed");
    assert!(!registry.has_key(Hive::LocalMachine, TS_POLICY));
    assert!(!registry.has_key(
        Hive::LocalMachine,
        r"SOFTWARE\Policies\Microsoft"
    ));
    assert_eq!(
        registry.get(Hive::LocalMachine, r"SOFTWARE\Policies", "Keep"),
        Some(RegValue::Dword(1))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn created_key_holding_foreign_subkey_is_kept() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    assert!(manager.apply_all().error.is_none());
    let foreign = format!(r"{TS_POLICY}\Client");
    registry.set(Hive::LocalMachine, &foreign, "Other", RegValue::Dword(7));

    manager.remove_all().expect("remove must succeed");
    assert!(registry.has_key(Hive::LocalMachine, TS_POLICY));
    assert_eq!(
        registry.get(Hive::LocalMachine, &foreign, "Other"),
        Some(RegValue::Dword(7))
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, TS_POLICY, "fAllowUnlistedRemotePrograms"),
        None
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn revert_uses_in_memory_backups_when_save_failed() {
    let dir = test_dir();
    let catalog = test_catalog(&dir);
    fs::create_dir_all(&catalog.backup_path).expect("block backup path with a directory");
    let registry = MemoryRegistry::new();
    registry.set(
        Hive::LocalMachine,
        WINLOGON,
        "AutoAdminLogon",
        RegValue::String("1".to_string()),
    );
    let manager = RegistryManager::new(&registry, catalog);

    let outcome = manager.apply_all();
    let err = outcome.error.expect("saving onto a directory must fail");
    assert_eq!(err.failure_count(), 1);
    assert_eq!(outcome.backups.len(), 9);

    let _ = manager.revert(&outcome.backups);
    assert_eq!(
        registry.get(Hive::LocalMachine, WINLOGON, "AutoAdminLogon"),
        Some(RegValue::String("1".to_string()))
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "ServerPort"),
        None
    );
    assert!(!registry.has_key(Hive::LocalMachine, APP_KEY_PATH));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn subkey_count_sees_direct_children_only() {
    let registry = MemoryRegistry::new();
    registry.set(Hive::LocalMachine, r"SOFTWARE\A\B\C", "V", RegValue::Dword(1));
    registry.set(Hive::LocalMachine, r"SOFTWARE\A\D", "V", RegValue::Dword(1));
    registry.set(Hive::LocalMachine, r"SOFTWARE\AB", "V", RegValue::Dword(1));

    assert_eq!(
        registry.subkey_count(Hive::LocalMachine, r"SOFTWARE\A").expect("count"),
        Some(2)
    );
    assert_eq!(
        registry.subkey_count(Hive::LocalMachine, r"software\a\b\c").expect("count"),
        Some(0)
    );
    assert_eq!(
        registry.subkey_count(Hive::LocalMachine, r"SOFTWARE\Missing").expect("count"),
        None
    );
    assert_eq!(
        registry.subkey_count(Hive::CurrentUser, r"SOFTWARE\A").expect("count"),
        None
    );
}

#[test]
fn restore_collects_failures_and_continues() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));
    let entries = sample_entries(3);

    let outcome = manager.apply_entries(&entries);
    assert!(outcome.error.is_none());
    registry.deny_writes(Hive::LocalMachine, r"SOFTWARE\Sample\Key2");

    let err = manager
        .restore(&outcome.backups)
        .expect_err("denied key must fail");
    assert_eq!(err.failure_count(), 1);
    assert_eq!(
        err.to_string(),
        "encountered 1 errors during registry restoration"
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, r"SOFTWARE\Sample\Key1", "Value"),
        None
    );
    assert_eq!(
        registry.get(Hive::LocalMachine, r"SOFTWARE\Sample\Key3", "Value"),
        None
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unreadable_backup_is_kept_and_values_deleted() {
    let dir = test_dir();
    let registry = MemoryRegistry::new();
    let manager = RegistryManager::new(&registry, test_catalog(&dir));

    assert!(manager.apply_all().error.is_none());
    fs::write(manager.backup_store().path(), "{ not json").expect("corrupt backup");

    let err = manager.remove_all().expect_err("parse failure is reported");
    match err {
        Error::Aggregate { failures, .. } => {
            assert!(failures
                .iter()
                .any(|failure| matches!(failure, Error::Parse { .. })));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(manager.backup_store().exists());
    assert_eq!(
        registry.get(Hive::LocalMachine, APP_KEY_PATH, "ServerPort"),
        None
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn backup_store_distinguishes_missing_from_empty() {
    let dir = test_dir();
    let store = BackupStore::new(dir.join("nested").join("registry_backup.json"));

    let err = store.load().expect_err("missing file");
    assert!(err.is_not_found());

    store.save(&BackupSet::new()).expect("save creates parents");
    let loaded = store.load().expect("empty set loads");
    assert!(loaded.is_empty());

    store.delete().expect("delete existing");
    store.delete().expect("delete missing is not an error");
    assert!(!store.exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn backup_store_writes_typed_records() {
    let dir = test_dir();
    let store = BackupStore::new(dir.join("registry_backup.json"));
    let port = Entry::value(
        Hive::LocalMachine,
        APP_KEY_PATH,
        "ServerPort",
        RegValue::Dword(8085),
    );
    let blob = Entry::value(
        Hive::CurrentUser,
        USER_KEY_PATH,
        "Blob",
        RegValue::Binary(vec![1, 2, 3]),
    );
    let backups = BackupSet::from(vec![
        Backup::capture(&port, true, Some(RegValue::Dword(80))),
        Backup::capture(&blob, true, Some(RegValue::Binary(vec![9]))),
        Backup::capture(&port, false, None).with_created_root(r"SOFTWARE\RDPLauncher"),
    ]);

    store.save(&backups).expect("save");
    let raw = fs::read_to_string(store.path()).expect("read raw");
    assert!(raw.contains("\"hive\": \"HKLM\""));
    assert!(raw.contains("\"value_type\": \"REG_DWORD\""));
    assert!(raw.contains("\"existed\": false"));
    assert_eq!(raw.matches("\"created_root\"").count(), 1);

    let loaded = store.load().expect("load");
    assert_eq!(loaded, backups);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn backup_store_rejects_malformed_records() {
    let dir = test_dir();
    fs::create_dir_all(&dir).expect("create dir");
    let store = BackupStore::new(dir.join("registry_backup.json"));

    fs::write(store.path(), "[{\"hive\": \"HKLM\"}]").expect("write");
    assert!(matches!(store.load(), Err(Error::Parse { .. })));

    let shape_mismatch = r#"[{"hive":"HKLM","key_path":"SOFTWARE\\X","value_name":"V","value_type":"REG_DWORD","value":"text","existed":true}]"#;
    fs::write(store.path(), shape_mismatch).expect("write");
    let err = store.load().expect_err("shape mismatch");
    assert!(err.to_string().contains("record 0"), "unexpected error: {err}");

    let overflow = r#"[{"hive":"HKLM","key_path":"SOFTWARE\\X","value_name":"V","value_type":"REG_DWORD","value":4294967296,"existed":true}]"#;
    fs::write(store.path(), overflow).expect("write");
    assert!(matches!(store.load(), Err(Error::Parse { .. })));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn string_codec_accepts_only_exact_terminated_utf16() {
    use crate::codec::{decode_utf16, encode_utf16};

    let bytes = encode_utf16("C:\\App\\rdplauncher.exe");
    assert_eq!(
        decode_utf16(&bytes).as_deref(),
        Some("C:\\App\\rdplauncher.exe")
    );
    assert_eq!(decode_utf16(&[0, 0]).as_deref(), Some(""));

    // unterminated, odd length, unpaired surrogate, empty
    assert_eq!(decode_utf16(&[b'a', 0]), None);
    assert_eq!(decode_utf16(&[b'a', 0, 0]), None);
    assert_eq!(decode_utf16(&[0x00, 0xd8, 0, 0]), None);
    assert_eq!(decode_utf16(&[]), None);

    // trailing padding is kept so restores write the same bytes back
    assert_eq!(decode_utf16(&[b'a', 0, 0, 0, 0, 0]).as_deref(), Some("a\0"));
    assert_eq!(encode_utf16("a\0"), vec![b'a', 0, 0, 0, 0, 0]);
}
