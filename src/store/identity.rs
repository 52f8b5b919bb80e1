use super::StoreError;
use super::schema::*;
use crate::AccountId;
use crate::UserId;
use crate::identity::AccountFacts;
use crate::identity::EdgeOrigin;
use crate::identity::SmurfEdge;
use crate::identity::SmurfStatus;
use const_format::concatcp;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tokio_postgres::Client;

/// Identity defines the account/user mapping and smurf-edge interface
/// between domain types and PostgreSQL. All identity SQL lives here.
#[async_trait::async_trait]
pub trait Identity: Send + Sync {
    async fn lookup_user_id(&self, account: AccountId) -> Result<Option<UserId>, StoreError>;
    async fn accounts_of(&self, user: UserId) -> Result<BTreeSet<AccountId>, StoreError>;
    /// true iff the id names a user, i.e. maps to itself
    async fn is_user(&self, id: i32) -> Result<bool, StoreError>;
    async fn adopt(&self, account: AccountId) -> Result<(), StoreError>;
    async fn reassign(&self, accounts: &BTreeSet<AccountId>, to: UserId) -> Result<(), StoreError>;
    async fn account_facts(
        &self,
        accounts: &BTreeSet<AccountId>,
    ) -> Result<Vec<AccountFacts>, StoreError>;
    async fn edges_among(&self, accounts: &BTreeSet<AccountId>)
    -> Result<Vec<SmurfEdge>, StoreError>;
    async fn edges_between(
        &self,
        left: &BTreeSet<AccountId>,
        right: &BTreeSet<AccountId>,
    ) -> Result<Vec<SmurfEdge>, StoreError>;
    async fn edge(&self, a: AccountId, b: AccountId) -> Result<Option<SmurfEdge>, StoreError>;
    /// every edge with at least one endpoint in the set
    async fn edges_of(&self, accounts: &BTreeSet<AccountId>) -> Result<Vec<SmurfEdge>, StoreError>;
    /// accounts ever observed on an exact address
    async fn accounts_on_ip(&self, ip: u32) -> Result<BTreeSet<AccountId>, StoreError>;
    async fn put_edge(&self, edge: SmurfEdge) -> Result<(), StoreError>;
    async fn drop_edge(&self, a: AccountId, b: AccountId) -> Result<(), StoreError>;
    async fn user_name(&self, user: UserId) -> Result<Option<String>, StoreError>;
    async fn upsert_user(&self, user: UserId, name: &str) -> Result<(), StoreError>;
    async fn rename_user(&self, user: UserId, name: &str) -> Result<(), StoreError>;
    async fn last_account_name(&self, account: AccountId) -> Result<Option<String>, StoreError>;
    /// exact IPs each account was observed on, straight from match rows
    async fn observed_ips(
        &self,
        accounts: &BTreeSet<AccountId>,
    ) -> Result<BTreeMap<AccountId, BTreeSet<u32>>, StoreError>;
    async fn stored_user_ips(&self, user: UserId) -> Result<Vec<(u32, u32)>, StoreError>;
    /// replace the user's aggregated ip ranges and refresh the nb_ips
    /// summary on every mapping row of the user
    async fn set_user_ips(&self, user: UserId, ranges: &[(u32, u32)]) -> Result<(), StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl Identity for Client {
    async fn lookup_user_id(&self, account: AccountId) -> Result<Option<UserId>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT user_id ",
            "FROM   ", USER_ACCOUNTS, " ",
            "WHERE  account_id = $1"
        );
        Ok(self
            .query_opt(SQL, &[&account])
            .await?
            .map(|row| row.get::<_, i32>(0)))
    }

    async fn accounts_of(&self, user: UserId) -> Result<BTreeSet<AccountId>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT account_id ",
            "FROM   ", USER_ACCOUNTS, " ",
            "WHERE  user_id = $1"
        );
        Ok(self
            .query(SQL, &[&user])
            .await?
            .iter()
            .map(|row| row.get::<_, i32>(0))
            .collect())
    }

    async fn is_user(&self, id: i32) -> Result<bool, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT 1 ",
            "FROM   ", USER_ACCOUNTS, " ",
            "WHERE  account_id = $1 ",
            "AND    user_id = $1"
        );
        Ok(self.query_opt(SQL, &[&id]).await?.is_some())
    }

    async fn adopt(&self, account: AccountId) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", USER_ACCOUNTS, " (account_id, user_id) ",
            "VALUES      ($1, $1) ",
            "ON CONFLICT (account_id) DO NOTHING"
        );
        self.execute(SQL, &[&account]).await?;
        Ok(())
    }

    async fn reassign(&self, accounts: &BTreeSet<AccountId>, to: UserId) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "UPDATE ", USER_ACCOUNTS, " ",
            "SET    user_id = $2 ",
            "WHERE  account_id = ANY($1)"
        );
        let ids = accounts.iter().copied().collect::<Vec<_>>();
        self.execute(SQL, &[&ids, &to]).await?;
        Ok(())
    }

    async fn account_facts(
        &self,
        accounts: &BTreeSet<AccountId>,
    ) -> Result<Vec<AccountFacts>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT account_id, rank, bot, cpu ",
            "FROM   ", ACCOUNTS, " ",
            "WHERE  account_id = ANY($1)"
        );
        let ids = accounts.iter().copied().collect::<Vec<_>>();
        let mut facts = self
            .query(SQL, &[&ids])
            .await?
            .iter()
            .map(|row| AccountFacts {
                account: row.get::<_, i32>(0),
                rank: row.get::<_, i16>(1),
                bot: row.get::<_, bool>(2),
                cpu: row.get::<_, Option<i64>>(3),
            })
            .collect::<Vec<_>>();
        // accounts may predate their facts row
        for &id in accounts {
            if !facts.iter().any(|f| f.account == id) {
                facts.push(AccountFacts { account: id, rank: 0, bot: false, cpu: None });
            }
        }
        Ok(facts)
    }

    async fn edges_among(&self, accounts: &BTreeSet<AccountId>)
    -> Result<Vec<SmurfEdge>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT id1, id2, status, origin ",
            "FROM   ", SMURFS, " ",
            "WHERE  id1 = ANY($1) ",
            "AND    id2 = ANY($1)"
        );
        let ids = accounts.iter().copied().collect::<Vec<_>>();
        self.query(SQL, &[&ids]).await?.iter().map(edge_of_row).collect()
    }

    async fn edges_between(
        &self,
        left: &BTreeSet<AccountId>,
        right: &BTreeSet<AccountId>,
    ) -> Result<Vec<SmurfEdge>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT id1, id2, status, origin ",
            "FROM   ", SMURFS, " ",
            "WHERE  (id1 = ANY($1) AND id2 = ANY($2)) ",
            "OR     (id1 = ANY($2) AND id2 = ANY($1))"
        );
        let l = left.iter().copied().collect::<Vec<_>>();
        let r = right.iter().copied().collect::<Vec<_>>();
        self.query(SQL, &[&l, &r]).await?.iter().map(edge_of_row).collect()
    }

    async fn edges_of(&self, accounts: &BTreeSet<AccountId>) -> Result<Vec<SmurfEdge>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT id1, id2, status, origin ",
            "FROM   ", SMURFS, " ",
            "WHERE  id1 = ANY($1) ",
            "OR     id2 = ANY($1)"
        );
        let ids = accounts.iter().copied().collect::<Vec<_>>();
        self.query(SQL, &[&ids]).await?.iter().map(edge_of_row).collect()
    }

    async fn accounts_on_ip(&self, ip: u32) -> Result<BTreeSet<AccountId>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT DISTINCT account_id ",
            "FROM   ", GAME_PLAYERS, " ",
            "WHERE  ip = $1"
        );
        Ok(self
            .query(SQL, &[&(ip as i64)])
            .await?
            .iter()
            .map(|row| row.get::<_, i32>(0))
            .collect())
    }

    async fn edge(&self, a: AccountId, b: AccountId) -> Result<Option<SmurfEdge>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT id1, id2, status, origin ",
            "FROM   ", SMURFS, " ",
            "WHERE  id1 = $1 ",
            "AND    id2 = $2"
        );
        match self.query_opt(SQL, &[&a.min(b), &a.max(b)]).await? {
            Some(ref row) => Ok(Some(edge_of_row(row)?)),
            None => Ok(None),
        }
    }

    async fn put_edge(&self, edge: SmurfEdge) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", SMURFS, " (id1, id2, status, origin) ",
            "VALUES      ($1, $2, $3, $4) ",
            "ON CONFLICT (id1, id2) ",
            "DO UPDATE SET status = EXCLUDED.status, origin = EXCLUDED.origin"
        );
        self.execute(SQL, &[&edge.id1, &edge.id2, &edge.status.id(), &edge.origin.id()])
            .await?;
        Ok(())
    }

    async fn drop_edge(&self, a: AccountId, b: AccountId) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "DELETE FROM ", SMURFS, " ",
            "WHERE  id1 = $1 ",
            "AND    id2 = $2"
        );
        self.execute(SQL, &[&a.min(b), &a.max(b)]).await?;
        Ok(())
    }

    async fn user_name(&self, user: UserId) -> Result<Option<String>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT name ",
            "FROM   ", USERS, " ",
            "WHERE  user_id = $1"
        );
        Ok(self.query_opt(SQL, &[&user]).await?.map(|row| row.get(0)))
    }

    async fn upsert_user(&self, user: UserId, name: &str) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", USERS, " (user_id, name) ",
            "VALUES      ($1, $2) ",
            "ON CONFLICT (user_id) DO NOTHING"
        );
        self.execute(SQL, &[&user, &name]).await?;
        Ok(())
    }

    async fn rename_user(&self, user: UserId, name: &str) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "UPDATE ", USERS, " ",
            "SET    name = $2 ",
            "WHERE  user_id = $1"
        );
        self.execute(SQL, &[&user, &name]).await?;
        Ok(())
    }

    async fn last_account_name(&self, account: AccountId) -> Result<Option<String>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   name ",
            "FROM     ", ACCOUNT_NAMES, " ",
            "WHERE    account_id = $1 ",
            "ORDER BY last_seen DESC NULLS LAST ",
            "LIMIT    1"
        );
        Ok(self.query_opt(SQL, &[&account]).await?.map(|row| row.get(0)))
    }

    async fn observed_ips(
        &self,
        accounts: &BTreeSet<AccountId>,
    ) -> Result<BTreeMap<AccountId, BTreeSet<u32>>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT account_id, ip ",
            "FROM   ", GAME_PLAYERS, " ",
            "WHERE  account_id = ANY($1) ",
            "AND    ip IS NOT NULL"
        );
        let ids = accounts.iter().copied().collect::<Vec<_>>();
        let mut observed = BTreeMap::<AccountId, BTreeSet<u32>>::new();
        for row in self.query(SQL, &[&ids]).await? {
            let account = row.get::<_, i32>(0);
            let ip = row.get::<_, i64>(1) as u32;
            observed.entry(account).or_default().insert(ip);
        }
        Ok(observed)
    }

    async fn stored_user_ips(&self, user: UserId) -> Result<Vec<(u32, u32)>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT ip_start, ip_end ",
            "FROM   ", USER_IPS, " ",
            "WHERE  user_id = $1"
        );
        Ok(self
            .query(SQL, &[&user])
            .await?
            .iter()
            .map(|row| (row.get::<_, i64>(0) as u32, row.get::<_, i64>(1) as u32))
            .collect())
    }

    async fn set_user_ips(&self, user: UserId, ranges: &[(u32, u32)]) -> Result<(), StoreError> {
        const WIPE: &str = concatcp!("DELETE FROM ", USER_IPS, " WHERE user_id = $1");
        const FILL: &str = concatcp!(
            "INSERT INTO ", USER_IPS, " (user_id, ip_start, ip_end) ",
            "VALUES      ($1, $2, $3)"
        );
        const COUNT: &str = concatcp!(
            "UPDATE ", USER_ACCOUNTS, " ",
            "SET    nb_ips = $2 ",
            "WHERE  user_id = $1"
        );
        self.execute(WIPE, &[&user]).await?;
        for &(start, end) in ranges {
            self.execute(FILL, &[&user, &(start as i64), &(end as i64)]).await?;
        }
        self.execute(COUNT, &[&user, &(ranges.len() as i32)]).await?;
        Ok(())
    }
}

fn edge_of_row(row: &tokio_postgres::Row) -> Result<SmurfEdge, StoreError> {
    let status = SmurfStatus::from_id(row.get::<_, i16>(2))
        .ok_or_else(|| StoreError::inconsistent("smurf status out of range"))?;
    let origin = EdgeOrigin::from_id(row.get::<_, i16>(3))
        .ok_or_else(|| StoreError::inconsistent("edge origin out of range"))?;
    Ok(SmurfEdge {
        id1: row.get::<_, i32>(0),
        id2: row.get::<_, i32>(1),
        status,
        origin,
    })
}
