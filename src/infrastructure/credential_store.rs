use crate::domain::models::OAuthToken;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredToken {
    Missing,
    Usable(OAuthToken),
    /// Past its expiry; already removed from the store.
    Expired,
}

pub trait CredentialStore: Send + Sync {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError>;
    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError>;
    fn delete_token(&self) -> Result<(), InfraError>;

    /// Loads the token for a remote call. A token that expires within
    /// `leeway_seconds` of `now` is deleted and reported as expired.
    fn load_usable_token(
        &self,
        now: DateTime<Utc>,
        leeway_seconds: i64,
    ) -> Result<StoredToken, InfraError> {
        match self.load_token()? {
            None => Ok(StoredToken::Missing),
            Some(token) if token.is_valid_at(now, leeway_seconds) => Ok(StoredToken::Usable(token)),
            Some(_) => {
                self.delete_token()?;
                Ok(StoredToken::Expired)
            }
        }
    }
}

fn ensure_storable(token: &OAuthToken) -> Result<(), InfraError> {
    if token.access_token.trim().is_empty() {
        return Err(InfraError::Validation(
            "access token must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("weekblock.google", "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        ensure_storable(token)?;
        let payload =
            serde_json::to_string(token).map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        match serde_json::from_str::<OAuthToken>(&payload) {
            Ok(token) => Ok(Some(token)),
            Err(error) => {
                self.delete_token()?;
                Err(InfraError::Credential(format!(
                    "stored token was unreadable and has been removed: {error}"
                )))
            }
        }
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Mutex<Option<OAuthToken>>,
}

impl InMemoryCredentialStore {
    pub fn with_token(token: OAuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<OAuthToken>>, InfraError> {
        self.token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        ensure_storable(token)?;
        *self.lock()? = Some(token.clone());
        Ok(())
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        Ok(self.lock()?.clone())
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        *self.lock()? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn in_memory_token_roundtrip(access_token in "[A-Za-z0-9._\\-]{1,64}") {
            let store = InMemoryCredentialStore::default();
            let token = OAuthToken::bearer(access_token);
            store.save_token(&token).expect("save token");
            let loaded = store.load_token().expect("load token").expect("token exists");
            prop_assert_eq!(loaded, token);
        }
    }

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn usable_token_respects_expiry_leeway() {
        let now = at("2026-02-16T09:00:00Z");
        let mut token = OAuthToken::bearer("abc");
        token.expires_at = Some(now + chrono::Duration::minutes(10));
        let store = InMemoryCredentialStore::with_token(token.clone());
        assert_eq!(
            store.load_usable_token(now, 60).expect("load"),
            StoredToken::Usable(token)
        );

        assert_eq!(
            store
                .load_usable_token(now + chrono::Duration::minutes(9) + chrono::Duration::seconds(30), 60)
                .expect("load"),
            StoredToken::Expired
        );
        assert!(store.load_token().expect("load").is_none());
        assert_eq!(store.load_usable_token(now, 60).expect("load"), StoredToken::Missing);
    }

    #[test]
    fn blank_token_is_not_stored() {
        let store = InMemoryCredentialStore::default();
        assert!(matches!(
            store.save_token(&OAuthToken::bearer("  ")),
            Err(InfraError::Validation(_))
        ));
        assert!(store.load_token().expect("load").is_none());
    }

    #[test]
    fn delete_clears_token() {
        let store = InMemoryCredentialStore::with_token(OAuthToken::bearer("abc"));
        store.delete_token().expect("delete");
        assert!(store.load_token().expect("load").is_none());
        store.delete_token().expect("delete twice");
    }
}
