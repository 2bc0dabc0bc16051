//! Provider backed entirely by the local JSON store

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AccountStore, LocalStore, StorageResult, SupplyStore, VisitStore, ACCOUNTS_KEY, SUPPLIES_KEY,
    VISITS_KEY,
};
use crate::domain::{
    apply_usage, default_accounts, default_supplies, Account, AccountUpdate, EntityId,
    NewAccount, PasswordHash, StoredAccount, Supply, SupplyInput, SupplyUsage, Visit, VisitDraft,
};
use crate::util::time::{display_timestamp, unix_millis};

/// Local provider. Read-modify-write cycles are serialized per process.
#[derive(Clone)]
pub struct LocalBackend {
    store: LocalStore,
    write_lock: Arc<Mutex<()>>,
}

impl LocalBackend {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn read_supplies(&self) -> Vec<Supply> {
        self.store.get_json(SUPPLIES_KEY, default_supplies())
    }

    fn read_visits(&self) -> Vec<Visit> {
        self.store.get_json(VISITS_KEY, Vec::new())
    }

    fn read_accounts(&self) -> Vec<StoredAccount> {
        match self.store.get_json::<Option<Vec<StoredAccount>>>(ACCOUNTS_KEY, None) {
            Some(accounts) => accounts,
            None => default_accounts(&display_timestamp()),
        }
    }
}

/// Next sequential id: one past the largest numeric id, or 1 when there is none
pub fn next_supply_id(supplies: &[Supply]) -> i64 {
    supplies
        .iter()
        .filter_map(|s| s.id.as_number())
        .max()
        .map(|max| max + 1)
        .unwrap_or(1)
}

/// Timestamp id, bumped past any existing id created in the same millisecond
fn next_visit_id(visits: &[Visit]) -> i64 {
    let now = unix_millis() as i64;
    match visits.iter().filter_map(|v| v.id.as_number()).max() {
        Some(max) if max >= now => max + 1,
        _ => now,
    }
}

#[async_trait]
impl SupplyStore for LocalBackend {
    async fn list_supplies(&self) -> StorageResult<Vec<Supply>> {
        Ok(self.read_supplies())
    }

    async fn create_supply(&self, input: &SupplyInput) -> StorageResult<Supply> {
        let _guard = self.write_lock.lock();
        let mut supplies = self.read_supplies();
        let supply = Supply {
            id: EntityId::Number(next_supply_id(&supplies)),
            nombre: input.nombre.clone(),
            cantidad: input.cantidad.max(0),
        };
        supplies.push(supply.clone());
        self.store.set_json(SUPPLIES_KEY, &supplies);
        Ok(supply)
    }

    async fn update_supply(&self, id: &EntityId, input: &SupplyInput) -> StorageResult<Option<Supply>> {
        let _guard = self.write_lock.lock();
        let mut supplies = self.read_supplies();
        let updated = supplies.iter_mut().find(|s| &s.id == id).map(|supply| {
            supply.nombre = input.nombre.clone();
            supply.cantidad = input.cantidad.max(0);
            supply.clone()
        });
        if updated.is_some() {
            self.store.set_json(SUPPLIES_KEY, &supplies);
        }
        Ok(updated)
    }

    async fn delete_supply(&self, id: &EntityId) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let mut supplies = self.read_supplies();
        let before = supplies.len();
        supplies.retain(|s| &s.id != id);
        if supplies.len() != before {
            self.store.set_json(SUPPLIES_KEY, &supplies);
        }
        Ok(())
    }

    async fn decrement_supplies(&self, usages: &[SupplyUsage]) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let mut supplies = self.read_supplies();
        apply_usage(&mut supplies, usages);
        self.store.set_json(SUPPLIES_KEY, &supplies);
        Ok(())
    }
}

#[async_trait]
impl VisitStore for LocalBackend {
    async fn list_visits(&self) -> StorageResult<Vec<Visit>> {
        Ok(self.read_visits())
    }

    async fn create_visit(&self, draft: &VisitDraft) -> StorageResult<Visit> {
        let _guard = self.write_lock.lock();
        let mut visits = self.read_visits();
        let visit = Visit {
            id: EntityId::Number(next_visit_id(&visits)),
            details: draft.clone(),
            created_at: Some(chrono::Utc::now()),
        };
        visits.insert(0, visit.clone());
        self.store.set_json(VISITS_KEY, &visits);
        Ok(visit)
    }

    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> StorageResult<Option<Visit>> {
        let _guard = self.write_lock.lock();
        let mut visits = self.read_visits();
        let updated = visits.iter_mut().find(|v| &v.id == id).map(|visit| {
            visit.details = draft.clone();
            visit.clone()
        });
        if updated.is_some() {
            self.store.set_json(VISITS_KEY, &visits);
        }
        Ok(updated)
    }

    async fn delete_visit(&self, id: &EntityId) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let mut visits = self.read_visits();
        let before = visits.len();
        visits.retain(|v| &v.id != id);
        if visits.len() != before {
            self.store.set_json(VISITS_KEY, &visits);
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for LocalBackend {
    async fn list_accounts(&self) -> StorageResult<Vec<Account>> {
        Ok(self.read_accounts().into_iter().map(|a| a.account).collect())
    }

    async fn create_account(&self, new: &NewAccount) -> StorageResult<Account> {
        let _guard = self.write_lock.lock();
        let mut accounts = self.read_accounts();
        let mut id = unix_millis();
        while accounts.iter().any(|a| a.account.id == id.to_string()) {
            id += 1;
        }
        let account = Account {
            id: id.to_string(),
            usuario: new.usuario.clone(),
            email: new.email.clone(),
            rut: new.rut.clone(),
            cargo: new.cargo.clone(),
            fecha: display_timestamp(),
            uid: None,
        };
        let password = (!new.password.is_empty()).then(|| PasswordHash::new(&new.password));
        accounts.push(StoredAccount {
            account: account.clone(),
            password,
        });
        self.store.set_json(ACCOUNTS_KEY, &accounts);
        Ok(account)
    }

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> StorageResult<Option<Account>> {
        let _guard = self.write_lock.lock();
        let mut accounts = self.read_accounts();
        let updated = accounts.iter_mut().find(|a| a.account.id == id).map(|stored| {
            let account = &mut stored.account;
            if let Some(usuario) = &update.usuario {
                account.usuario = usuario.clone();
            }
            if let Some(email) = &update.email {
                account.email = email.clone();
            }
            if let Some(rut) = &update.rut {
                account.rut = rut.clone();
            }
            if let Some(cargo) = &update.cargo {
                account.cargo = cargo.clone();
            }
            if let Some(password) = update.password.as_deref().filter(|p| !p.is_empty()) {
                stored.password = Some(PasswordHash::new(password));
            }
            stored.account.clone()
        });
        if updated.is_some() {
            self.store.set_json(ACCOUNTS_KEY, &accounts);
        }
        Ok(updated)
    }

    async fn delete_account(&self, id: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let mut accounts = self.read_accounts();
        accounts.retain(|a| a.account.id != id);
        self.store.set_json(ACCOUNTS_KEY, &accounts);
        Ok(())
    }

    async fn validate_credentials(
        &self,
        user_or_email: &str,
        password: &str,
    ) -> StorageResult<Option<Account>> {
        let found = self.read_accounts().into_iter().find(|stored| {
            let account = &stored.account;
            (account.usuario == user_or_email || account.email == user_or_email)
                && stored
                    .password
                    .as_ref()
                    .map(|hash| hash.verify(password))
                    .unwrap_or(false)
        });
        Ok(found.map(|stored| stored.account))
    }
}
