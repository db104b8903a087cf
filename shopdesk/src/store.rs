/// Durable credential storage, one record per identity
use crate::identifiers::Identity;
use crate::models::TokenPair;
use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_test() {
        assert!(MIGRATIONS.validate().is_ok());
    }

    #[tokio::test]
    async fn test_upsert_get_remove() {
        let store = CredentialStore::open_ephemeral().unwrap();
        let id = Identity(42);

        assert_eq!(store.get(id).await.unwrap(), None);
        assert!(!store.is_authorized(id).await.unwrap());

        store.upsert(id, &TokenPair::new("A1", "R1")).await.unwrap();
        assert!(store.is_authorized(id).await.unwrap());
        assert_eq!(
            store.get(id).await.unwrap(),
            Some(TokenPair::new("A1", "R1"))
        );

        // last write wins
        store.upsert(id, &TokenPair::new("A9", "R9")).await.unwrap();
        assert_eq!(
            store.get(id).await.unwrap(),
            Some(TokenPair::new("A9", "R9"))
        );

        assert!(store.remove(id).await.unwrap());
        assert_eq!(store.get(id).await.unwrap(), None);
        assert!(!store.is_authorized(id).await.unwrap());
        // idempotent
        assert!(!store.remove(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_access_token() {
        let store = CredentialStore::open_ephemeral().unwrap();
        let id = Identity(42);
        store.upsert(id, &TokenPair::new("A1", "R1")).await.unwrap();

        assert!(store.update_access_token(id, "A2").await.unwrap());
        assert_eq!(
            store.get(id).await.unwrap(),
            Some(TokenPair::new("A2", "R1"))
        );

        // nothing on file: silently does nothing, and does not create a record
        assert!(!store.update_access_token(Identity(7), "A2").await.unwrap());
        assert_eq!(store.get(Identity(7)).await.unwrap(), None);

        assert!(store.update_access_token(id, "").await.is_err());
    }

    #[tokio::test]
    async fn test_replace_tokens_does_not_resurrect() {
        let store = CredentialStore::open_ephemeral().unwrap();
        let id = Identity(3);
        assert!(!store
            .replace_tokens(id, &TokenPair::new("A2", "R2"))
            .await
            .unwrap());
        assert_eq!(store.get(id).await.unwrap(), None);

        store.upsert(id, &TokenPair::new("A1", "R1")).await.unwrap();
        assert!(store
            .replace_tokens(id, &TokenPair::new("A2", "R2"))
            .await
            .unwrap());
        assert_eq!(
            store.get(id).await.unwrap(),
            Some(TokenPair::new("A2", "R2"))
        );
    }

    #[tokio::test]
    async fn test_list_authorized() {
        let store = CredentialStore::open_ephemeral().unwrap();
        assert!(store.list_authorized().await.unwrap().is_empty());
        for id in [5, 1, 3] {
            store
                .upsert(Identity(id), &TokenPair::new("A", "R"))
                .await
                .unwrap();
        }
        store.remove(Identity(3)).await.unwrap();
        assert_eq!(
            store.list_authorized().await.unwrap(),
            vec![Identity(1), Identity(5)]
        );
    }

    #[tokio::test]
    async fn test_incomplete_pair_rejected() {
        let store = CredentialStore::open_ephemeral().unwrap();
        assert!(store
            .upsert(Identity(1), &TokenPair::new("A1", ""))
            .await
            .is_err());
        assert!(!store.is_authorized(Identity(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.sqlite");
        {
            let store = CredentialStore::open(&path).unwrap();
            store
                .upsert(Identity(42), &TokenPair::new("A1", "R1"))
                .await
                .unwrap();
        }
        let store = CredentialStore::open(&path).unwrap();
        assert_eq!(
            store.get(Identity(42)).await.unwrap(),
            Some(TokenPair::new("A1", "R1"))
        );
    }
}

lazy_static! {
    static ref MIGRATIONS: Migrations<'static> =
        Migrations::new(vec![M::up(include_str!("credential_db.sql")),]);
}

/// Identity to token pair mapping, backed by sqlite.
///
/// All callers share a single connection behind a mutex, so every operation is atomic with
/// respect to every other. Statements run on tokio's blocking pool; the store is cheap to
/// clone.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl CredentialStore {
    pub fn open(path: &Path) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        MIGRATIONS.to_latest(&mut conn)?;
        // any pragma would happen here
        Ok(CredentialStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, eg for tests. Contents are gone once the last clone is dropped.
    pub fn open_ephemeral() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        MIGRATIONS.to_latest(&mut conn)?;
        Ok(CredentialStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await?
    }

    /// Creates or replaces the record for `identity`, marking it authorized
    pub async fn upsert(&self, identity: Identity, tokens: &TokenPair) -> Result<()> {
        if !tokens.is_complete() {
            return Err(anyhow!(
                "refusing to store an incomplete token pair for identity {}",
                identity
            ));
        }
        let tokens = tokens.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT OR REPLACE INTO credential (identity, is_authorized, access_token, refresh_token) VALUES (?1, 1, ?2, ?3)",
            )?;
            stmt.execute(params!(identity.0, tokens.access_token, tokens.refresh_token))?;
            debug!("stored credentials for identity {}", identity);
            Ok(())
        })
        .await
    }

    /// Returns true if there was a record to delete
    pub async fn remove(&self, identity: Identity) -> Result<bool> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached("DELETE FROM credential WHERE identity = ?1")?;
            let count = stmt.execute(params!(identity.0))?;
            Ok(count >= 1)
        })
        .await
    }

    /// Current token pair, or None if the identity is not authorized
    pub async fn get(&self, identity: Identity) -> Result<Option<TokenPair>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT access_token, refresh_token FROM credential WHERE identity = ?1 AND is_authorized = 1",
            )?;
            let row: Option<(Option<String>, Option<String>)> = stmt
                .query_row(params!(identity.0), |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            Ok(match row {
                Some((Some(access_token), Some(refresh_token))) => {
                    let tokens = TokenPair {
                        access_token,
                        refresh_token,
                    };
                    Some(tokens).filter(TokenPair::is_complete)
                }
                _ => None,
            })
        })
        .await
    }

    pub async fn is_authorized(&self, identity: Identity) -> Result<bool> {
        Ok(self.get(identity).await?.is_some())
    }

    /// Every identity currently holding a complete token pair, in ascending order
    pub async fn list_authorized(&self) -> Result<Vec<Identity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT identity FROM credential WHERE is_authorized = 1 AND access_token <> '' AND refresh_token <> '' ORDER BY identity",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids.into_iter().map(Identity).collect())
        })
        .await
    }

    /// Swaps in a new access token, keeping the refresh token.
    ///
    /// Does nothing (returns false) if there is no record for `identity`; a token can't be
    /// refreshed for an identity that logged out in the meantime.
    pub async fn update_access_token(&self, identity: Identity, access_token: &str) -> Result<bool> {
        if access_token.is_empty() {
            return Err(anyhow!("refusing to store an empty access token"));
        }
        let access_token = access_token.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "UPDATE credential SET access_token = ?1 WHERE identity = ?2 AND is_authorized = 1",
            )?;
            let count = stmt.execute(params!(access_token, identity.0))?;
            Ok(count >= 1)
        })
        .await
    }

    /// Swaps in both tokens of an existing record. Same no-op semantics as
    /// `update_access_token`.
    pub async fn replace_tokens(&self, identity: Identity, tokens: &TokenPair) -> Result<bool> {
        if !tokens.is_complete() {
            return Err(anyhow!("refusing to store an incomplete token pair"));
        }
        let tokens = tokens.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "UPDATE credential SET access_token = ?1, refresh_token = ?2 WHERE identity = ?3 AND is_authorized = 1",
            )?;
            let count = stmt.execute(params!(
                tokens.access_token,
                tokens.refresh_token,
                identity.0
            ))?;
            Ok(count >= 1)
        })
        .await
    }
}
