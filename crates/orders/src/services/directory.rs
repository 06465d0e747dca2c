//! Postgres-backed address lookup and user directory.

use async_trait::async_trait;
use sqlx::PgPool;

use grocer_core::{Address, AddressId, User, UserId};

use super::{AddressLookup, UserDirectory};
use crate::db::{self, RepositoryError};

/// Reads addresses from the `addresses` table.
#[derive(Debug, Clone)]
pub struct PgAddressLookup {
    pool: PgPool,
}

impl PgAddressLookup {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressLookup for PgAddressLookup {
    async fn get_owned(
        &self,
        address_id: AddressId,
        user_id: UserId,
    ) -> Result<Option<Address>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        db::addresses::get_owned(&mut conn, address_id, user_id).await
    }
}

/// Reads users from the `users` table.
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        db::users::get(&mut conn, user_id).await
    }

    async fn list_admins(&self) -> Result<Vec<User>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        db::users::list_admins(&mut conn).await
    }
}
