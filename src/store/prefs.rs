use super::StoreError;
use super::schema::*;
use crate::AccountId;
use crate::UserId;
use const_format::concatcp;
use tokio_postgres::Client;

/// PrefStore defines raw preference row access. Validation and default
/// values live in the prefs domain module; this layer only stores the
/// case-canonical rows.
#[async_trait::async_trait]
pub trait PrefStore: Send + Sync {
    async fn account_pref(
        &self,
        account: AccountId,
        name: &str,
    ) -> Result<Option<String>, StoreError>;
    async fn set_account_pref(
        &self,
        account: AccountId,
        name: &str,
        value: &str,
    ) -> Result<(), StoreError>;
    async fn user_pref(&self, user: UserId, name: &str) -> Result<Option<String>, StoreError>;
    async fn set_user_pref(
        &self,
        user: UserId,
        name: &str,
        value: &str,
    ) -> Result<(), StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl PrefStore for Client {
    async fn account_pref(
        &self,
        account: AccountId,
        name: &str,
    ) -> Result<Option<String>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT value ",
            "FROM   ", ACCOUNT_PREFS, " ",
            "WHERE  account_id = $1 ",
            "AND    LOWER(name) = LOWER($2)"
        );
        Ok(self.query_opt(SQL, &[&account, &name]).await?.map(|row| row.get(0)))
    }

    async fn set_account_pref(
        &self,
        account: AccountId,
        name: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", ACCOUNT_PREFS, " (account_id, name, value) ",
            "VALUES      ($1, $2, $3) ",
            "ON CONFLICT (account_id, name) DO UPDATE SET value = EXCLUDED.value"
        );
        self.execute(SQL, &[&account, &name, &value]).await?;
        Ok(())
    }

    async fn user_pref(&self, user: UserId, name: &str) -> Result<Option<String>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT value ",
            "FROM   ", USER_PREFS, " ",
            "WHERE  user_id = $1 ",
            "AND    LOWER(name) = LOWER($2)"
        );
        Ok(self.query_opt(SQL, &[&user, &name]).await?.map(|row| row.get(0)))
    }

    async fn set_user_pref(
        &self,
        user: UserId,
        name: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", USER_PREFS, " (user_id, name, value) ",
            "VALUES      ($1, $2, $3) ",
            "ON CONFLICT (user_id, name) DO UPDATE SET value = EXCLUDED.value"
        );
        self.execute(SQL, &[&user, &name, &value]).await?;
        Ok(())
    }
}
