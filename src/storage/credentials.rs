//! Credential stores.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Credentials;

/// Environment variable holding the portal user name.
pub const USERNAME_VAR: &str = "UNIFY_USERNAME";
/// Environment variable holding the portal password.
pub const PASSWORD_VAR: &str = "UNIFY_PASSWORD";

/// Source of the portal login.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored credentials, `None` when either half is missing.
    async fn get(&self) -> Result<Option<Credentials>>;

    async fn save(&self, credentials: &Credentials) -> Result<()>;

    async fn delete(&self) -> Result<()>;

    /// Credentials or a `Credentials` error naming the store.
    async fn require(&self) -> Result<Credentials> {
        self.get()
            .await?
            .ok_or_else(|| AppError::credentials(format!("No credentials in {}", self.name())))
    }

    fn name(&self) -> &'static str;
}

/// Read-only credentials from `UNIFY_USERNAME` / `UNIFY_PASSWORD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn read(var: &str) -> Option<String> {
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl CredentialStore for EnvCredentials {
    async fn get(&self) -> Result<Option<Credentials>> {
        Ok(Self::read(USERNAME_VAR)
            .zip(Self::read(PASSWORD_VAR))
            .map(|(username, password)| Credentials { username, password }))
    }

    async fn save(&self, _credentials: &Credentials) -> Result<()> {
        Err(AppError::credentials(
            "Environment credentials are read-only",
        ))
    }

    async fn delete(&self) -> Result<()> {
        Err(AppError::credentials(
            "Environment credentials are read-only",
        ))
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

#[cfg(feature = "keyring")]
pub use os::KeyringStore;

#[cfg(feature = "keyring")]
mod os {
    use async_trait::async_trait;
    use keyring::Entry;

    use super::CredentialStore;
    use crate::error::{AppError, Result};
    use crate::models::Credentials;

    const SERVICE: &str = "UnifyExport";
    const USERNAME_KEY: &str = "unify-username";
    const PASSWORD_KEY: &str = "unify-password";

    /// Credentials kept in the OS keychain.
    #[derive(Debug, Clone)]
    pub struct KeyringStore {
        service: String,
    }

    impl Default for KeyringStore {
        fn default() -> Self {
            Self {
                service: SERVICE.to_string(),
            }
        }
    }

    impl KeyringStore {
        pub fn with_service(service: impl Into<String>) -> Self {
            Self {
                service: service.into(),
            }
        }

        fn entry(&self, key: &str) -> Result<Entry> {
            Entry::new(&self.service, key).map_err(|e| AppError::credentials(e.to_string()))
        }

        fn read(&self, key: &str) -> Result<Option<String>> {
            match self.entry(key)?.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(AppError::credentials(format!("Reading {key}: {e}"))),
            }
        }

        fn remove(&self, key: &str) -> Result<()> {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(AppError::credentials(format!("Deleting {key}: {e}"))),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for KeyringStore {
        async fn get(&self) -> Result<Option<Credentials>> {
            let username = self.read(USERNAME_KEY)?;
            let password = self.read(PASSWORD_KEY)?;
            Ok(username
                .zip(password)
                .map(|(username, password)| Credentials { username, password }))
        }

        async fn save(&self, credentials: &Credentials) -> Result<()> {
            self.entry(USERNAME_KEY)?
                .set_password(&credentials.username)
                .map_err(|e| AppError::credentials(e.to_string()))?;
            self.entry(PASSWORD_KEY)?
                .set_password(&credentials.password)
                .map_err(|e| AppError::credentials(e.to_string()))?;
            log::info!("Credentials saved to keyring service {}", self.service);
            Ok(())
        }

        async fn delete(&self) -> Result<()> {
            self.remove(USERNAME_KEY)?;
            self.remove(PASSWORD_KEY)
        }

        fn name(&self) -> &'static str {
            "OS keyring"
        }
    }
}
