use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::domain::{Rectification, Role, UserRecord};

/// Storage abstraction for marketplace accounts.
pub trait UserRepository: Send + Sync {
    fn insert(&self, user: UserRecord) -> Result<UserRecord, UserStoreError>;
    fn get(&self, id: &str) -> Result<Option<UserRecord>, UserStoreError>;
    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, UserStoreError>;
    fn update_profile(
        &self,
        id: &str,
        display_name: Option<String>,
        phone: Option<String>,
    ) -> Result<UserRecord, UserStoreError>;
    fn rectify(&self, id: &str, changes: Rectification) -> Result<UserRecord, UserStoreError>;
    fn anonymize(&self, id: &str) -> Result<UserRecord, UserStoreError>;
    fn set_restriction(&self, id: &str, restricted: bool) -> Result<UserRecord, UserStoreError>;
    fn assign_role(&self, id: &str, role: Role) -> Result<UserRecord, UserStoreError>;
    fn link_stripe_account(&self, id: &str, account_id: &str)
        -> Result<UserRecord, UserStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("an account already uses this email")]
    Conflict,
    #[error("user not found")]
    NotFound,
    #[error("email already in use by another account")]
    EmailInUse,
}

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify<F>(&self, id: &str, change: F) -> Result<UserRecord, UserStoreError>
    where
        F: FnOnce(&HashMap<String, UserRecord>, &mut UserRecord) -> Result<(), UserStoreError>,
    {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = users.get(id).cloned().ok_or(UserStoreError::NotFound)?;
        change(&users, &mut record)?;
        users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn clear(&self) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn email_taken(users: &HashMap<String, UserRecord>, email: &str, except: &str) -> bool {
    users
        .values()
        .any(|user| user.email == email && user.id != except)
}

impl UserRepository for InMemoryUserRepository {
    fn insert(&self, user: UserRecord) -> Result<UserRecord, UserStoreError> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(&user.id) || email_taken(&users, &user.email, &user.id) {
            return Err(UserStoreError::Conflict);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn get(&self, id: &str) -> Result<Option<UserRecord>, UserStoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, UserStoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    fn update_profile(
        &self,
        id: &str,
        display_name: Option<String>,
        phone: Option<String>,
    ) -> Result<UserRecord, UserStoreError> {
        self.modify(id, |_, record| {
            if display_name.is_some() {
                record.display_name = display_name;
            }
            if phone.is_some() {
                record.phone = phone;
            }
            Ok(())
        })
    }

    fn rectify(&self, id: &str, changes: Rectification) -> Result<UserRecord, UserStoreError> {
        self.modify(id, |users, record| {
            if let Some(email) = changes.email {
                if email != record.email && email_taken(users, &email, id) {
                    return Err(UserStoreError::EmailInUse);
                }
                record.email = email;
            }
            if changes.display_name.is_some() {
                record.display_name = changes.display_name;
            }
            if changes.phone.is_some() {
                record.phone = changes.phone;
            }
            Ok(())
        })
    }

    fn anonymize(&self, id: &str) -> Result<UserRecord, UserStoreError> {
        self.modify(id, |_, record| {
            record.email = format!("anonymized+{}@example.invalid", record.id);
            record.display_name = None;
            record.phone = None;
            record.restricted = true;
            Ok(())
        })
    }

    fn set_restriction(&self, id: &str, restricted: bool) -> Result<UserRecord, UserStoreError> {
        self.modify(id, |_, record| {
            record.restricted = restricted;
            Ok(())
        })
    }

    fn assign_role(&self, id: &str, role: Role) -> Result<UserRecord, UserStoreError> {
        self.modify(id, |_, record| {
            record.role = role;
            if !record.roles.contains(&role) {
                record.roles.push(role);
            }
            Ok(())
        })
    }

    fn link_stripe_account(
        &self,
        id: &str,
        account_id: &str,
    ) -> Result<UserRecord, UserStoreError> {
        self.modify(id, |_, record| {
            record.stripe_account_id = Some(account_id.to_string());
            Ok(())
        })
    }
}
