use std::collections::HashSet;

use rdpl_core::{Backup, BackupSet, Catalog, Entry, Error, Hive, Result};
use tracing::{debug, info, warn};

use crate::{BackupStore, KeyState, RegistryBackend};

/// Applies, backs up, restores and removes the catalog's registry entries.
pub struct RegistryManager<'a, R: ?Sized> {
    backend: &'a R,
    catalog: Catalog,
    store: BackupStore,
}

/// Result of applying entries: the backups are always returned, even when some
/// entries failed or persisting them failed.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub backups: BackupSet,
    pub error: Option<Error>,
}

impl<'a, R: RegistryBackend + ?Sized> RegistryManager<'a, R> {
    pub fn new(backend: &'a R, catalog: Catalog) -> Self {
        let store = BackupStore::new(catalog.backup_path.clone());
        Self {
            backend,
            catalog,
            store,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn backup_store(&self) -> &BackupStore {
        &self.store
    }

    pub fn apply_all(&self) -> ApplyOutcome {
        self.apply_entries(&self.catalog.entries)
    }

    /// Applies `entries` in order, then persists whatever backups were captured.
    ///
    /// Every entry is snapshotted before the first write, so entries sharing a key all
    /// observe the pre-install state. A failing entry is skipped and reported; it
    /// contributes no backup.
    pub fn apply_entries(&self, entries: &[Entry]) -> ApplyOutcome {
        let mut backups = BackupSet::new();
        let mut failures = Vec::new();

        let snapshots = entries
            .iter()
            .map(|entry| self.snapshot(entry))
            .collect::<Vec<_>>();

        for (entry, snapshot) in entries.iter().zip(snapshots) {
            match snapshot.and_then(|backup| self.write_entry(entry).map(|()| backup)) {
                Ok(backup) => {
                    debug!(
                        location = %entry.location(),
                        existed = backup.existed,
                        "applied registry entry"
                    );
                    backups.push(backup);
                }
                Err(err) => {
                    warn!(location = %entry.location(), error = %err, "failed to apply registry entry");
                    failures.push(err);
                }
            }
        }

        if let Err(err) = self.store.save(&backups) {
            failures.push(err);
        }

        ApplyOutcome {
            backups,
            error: Error::aggregate("registry creation", failures).err(),
        }
    }

    fn snapshot(&self, entry: &Entry) -> Result<Backup> {
        let state = self
            .backend
            .inspect(entry.hive, &entry.key_path, &entry.value_name)?;
        Ok(match state {
            KeyState::Missing => Backup::capture(entry, false, None)
                .with_created_root(self.outermost_missing(entry.hive, &entry.key_path)?),
            KeyState::Present { value } => Backup::capture(entry, true, value),
        })
    }

    /// Walks up from a missing key to the outermost ancestor that is also missing.
    fn outermost_missing<'k>(&self, hive: Hive, key_path: &'k str) -> Result<&'k str> {
        let mut root = key_path;
        while let Some((parent, _)) = root.rsplit_once('\\') {
            match self.backend.inspect(hive, parent, "")? {
                KeyState::Missing => root = parent,
                KeyState::Present { .. } => break,
            }
        }
        Ok(root)
    }

    fn write_entry(&self, entry: &Entry) -> Result<()> {
        if entry.is_key_only() {
            return self.backend.create_key(entry.hive, &entry.key_path);
        }
        let value = entry.checked_value()?;
        self.backend.create_key(entry.hive, &entry.key_path)?;
        self.backend
            .write_value(entry.hive, &entry.key_path, &entry.value_name, value)
    }

    /// Puts every backed-up entry back the way it was.
    ///
    /// Entries are independent; every one is attempted and failures are aggregated.
    pub fn restore(&self, backups: &BackupSet) -> Result<()> {
        let mut failures = Vec::new();
        for backup in backups {
            if let Err(err) = self.restore_one(backup) {
                warn!(location = %backup.location(), error = %err, "failed to restore registry entry");
                failures.push(err);
            }
        }
        Error::aggregate("registry restoration", failures)
    }

    fn restore_one(&self, backup: &Backup) -> Result<()> {
        if backup.value_name.is_empty() {
            // key-existence entries are left for the pruning pass
            return Ok(());
        }
        if !backup.existed {
            return self
                .backend
                .delete_value(backup.hive, &backup.key_path, &backup.value_name);
        }

        self.backend.create_key(backup.hive, &backup.key_path)?;
        match &backup.original_value {
            Some(value) => {
                self.backend
                    .write_value(backup.hive, &backup.key_path, &backup.value_name, value)
            }
            None => self
                .backend
                .delete_value(backup.hive, &backup.key_path, &backup.value_name),
        }
    }

    /// Undoes an apply from its backups: restores values, removes the keys the apply
    /// created once they are empty, prunes owned keys and deletes the backup file.
    ///
    /// Every step is attempted; failures are aggregated.
    pub fn revert(&self, backups: &BackupSet) -> Result<()> {
        let mut failures = Vec::new();
        collect(&mut failures, self.restore(backups));
        self.remove_created_keys(backups, &mut failures);
        self.prune_owned_keys(&mut failures);
        collect(&mut failures, self.store.delete());
        Error::aggregate("registry cleanup", failures)
    }

    /// Reverts everything `apply_all` did, from the persisted backup.
    ///
    /// Without a backup file only the catalog's own named values are deleted. Owned keys
    /// left without values are pruned either way.
    pub fn remove_all(&self) -> Result<()> {
        let mut failures = Vec::new();
        match self.store.load() {
            Ok(backups) => {
                info!(count = backups.len(), "restoring registry entries from backup");
                return self.revert(&backups);
            }
            Err(err) if err.is_not_found() => {
                warn!(
                    path = %self.store.path().display(),
                    "no registry backup found, deleting catalog values"
                );
                self.delete_catalog_values(&mut failures);
            }
            Err(err) => {
                // the unreadable file is kept for inspection
                warn!(error = %err, "registry backup unreadable, deleting catalog values");
                failures.push(err);
                self.delete_catalog_values(&mut failures);
            }
        }

        self.prune_owned_keys(&mut failures);
        Error::aggregate("registry cleanup", failures)
    }

    fn remove_created_keys(&self, backups: &BackupSet, failures: &mut Vec<Error>) {
        for backup in backups {
            for key_path in backup.created_keys() {
                match self.remove_key_if_empty(backup.hive, key_path) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        failures.push(err);
                        break;
                    }
                }
            }
        }
    }

    /// Returns `true` when the key is gone afterwards.
    fn remove_key_if_empty(&self, hive: Hive, key_path: &str) -> Result<bool> {
        let Some(values) = self.backend.value_names(hive, key_path)? else {
            return Ok(true);
        };
        if !values.is_empty() || self.backend.subkey_count(hive, key_path)? != Some(0) {
            return Ok(false);
        }
        self.backend.delete_key(hive, key_path)?;
        debug!(key = %format!("{hive}\\{key_path}"), "removed registry key created by install");
        Ok(true)
    }

    fn delete_catalog_values(&self, failures: &mut Vec<Error>) {
        for entry in self.catalog.entries.iter().filter(|e| !e.is_key_only()) {
            collect(
                failures,
                self.backend
                    .delete_value(entry.hive, &entry.key_path, &entry.value_name),
            );
        }
    }

    fn prune_owned_keys(&self, failures: &mut Vec<Error>) {
        let mut seen: HashSet<(Hive, String)> = HashSet::new();
        for key in &self.catalog.owned_keys {
            if !seen.insert((key.hive, key.key_path.to_ascii_lowercase())) {
                continue;
            }
            match self.backend.value_names(key.hive, &key.key_path) {
                Ok(None) => {}
                Ok(Some(names)) if !names.is_empty() => {
                    debug!(
                        key = %format!("{}\\{}", key.hive, key.key_path),
                        remaining = names.len(),
                        "keeping registry key that still holds values"
                    );
                }
                Ok(Some(_)) => collect(failures, self.backend.delete_key(key.hive, &key.key_path)),
                Err(err) => failures.push(err),
            }
        }
    }
}

fn collect(failures: &mut Vec<Error>, result: Result<()>) {
    match result {
        Ok(()) => {}
        Err(Error::Aggregate {
            failures: nested, ..
        }) => failures.extend(nested),
        Err(err) => failures.push(err),
    }
}
