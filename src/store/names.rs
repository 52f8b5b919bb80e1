use super::StoreError;
use super::schema::*;
use crate::AccountId;
use crate::UserId;
use const_format::concatcp;
use tokio_postgres::Client;

/// outcome of a name search. ambiguity is reported per stage so callers
/// can tell an unlucky substring from a contested exact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Account(AccountId),
    User(UserId),
    AmbiguousName,
    AmbiguousSubnameAccount,
    AmbiguousSubnameUser,
    NotFound,
}

/// what one search stage saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageHits {
    None,
    One(i32),
    Many,
}

/// the four search stages, in account-first authority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ExactAccount,
    ExactUser,
    SubAccount,
    SubUser,
}

impl Stage {
    fn order(user_first: bool) -> [Stage; 4] {
        if user_first {
            [
                Stage::ExactUser,
                Stage::ExactAccount,
                Stage::SubUser,
                Stage::SubAccount,
            ]
        } else {
            [
                Stage::ExactAccount,
                Stage::ExactUser,
                Stage::SubAccount,
                Stage::SubUser,
            ]
        }
    }

    fn hit(&self, id: i32) -> NameMatch {
        match self {
            Stage::ExactAccount | Stage::SubAccount => NameMatch::Account(id),
            Stage::ExactUser | Stage::SubUser => NameMatch::User(id),
        }
    }

    fn ambiguity(&self) -> NameMatch {
        match self {
            Stage::ExactAccount => NameMatch::AmbiguousName,
            // an ambiguous exact user name cannot happen (unique column),
            // but the stage still needs an answer
            Stage::ExactUser => NameMatch::AmbiguousName,
            Stage::SubAccount => NameMatch::AmbiguousSubnameAccount,
            Stage::SubUser => NameMatch::AmbiguousSubnameUser,
        }
    }
}

/// stage authority: the first stage to see anything, unique or not,
/// decides the outcome
fn resolve(stages: &[(Stage, StageHits)]) -> NameMatch {
    for (stage, hits) in stages {
        match hits {
            StageHits::None => continue,
            StageHits::One(id) => return stage.hit(*id),
            StageHits::Many => return stage.ambiguity(),
        }
    }
    NameMatch::NotFound
}

/// Directory defines the account/user name lookup interface, including
/// the staged identify-by-name search the admin commands rely on.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    async fn identify(&self, search: &str, user_first: bool) -> Result<NameMatch, StoreError>;
    async fn observe_name(
        &self,
        account: AccountId,
        name: &str,
        seen: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl Directory for Client {
    async fn identify(&self, search: &str, user_first: bool) -> Result<NameMatch, StoreError> {
        const EXACT_ACCOUNT: &str = concatcp!(
            "SELECT DISTINCT account_id ",
            "FROM   ", ACCOUNT_NAMES, " ",
            "WHERE  LOWER(name) = LOWER($1) ",
            "LIMIT  2"
        );
        const EXACT_USER: &str = concatcp!(
            "SELECT user_id ",
            "FROM   ", USERS, " ",
            "WHERE  LOWER(name) = LOWER($1) ",
            "LIMIT  2"
        );
        const SUB_ACCOUNT: &str = concatcp!(
            "SELECT DISTINCT account_id ",
            "FROM   ", ACCOUNT_NAMES, " ",
            "WHERE  POSITION(LOWER($1) IN LOWER(name)) > 0 ",
            "LIMIT  2"
        );
        const SUB_USER: &str = concatcp!(
            "SELECT user_id ",
            "FROM   ", USERS, " ",
            "WHERE  POSITION(LOWER($1) IN LOWER(name)) > 0 ",
            "LIMIT  2"
        );
        let mut seen = Vec::new();
        for stage in Stage::order(user_first) {
            let sql = match stage {
                Stage::ExactAccount => EXACT_ACCOUNT,
                Stage::ExactUser => EXACT_USER,
                Stage::SubAccount => SUB_ACCOUNT,
                Stage::SubUser => SUB_USER,
            };
            let rows = self.query(sql, &[&search]).await?;
            let hits = match rows.len() {
                0 => StageHits::None,
                1 => StageHits::One(rows[0].get::<_, i32>(0)),
                _ => StageHits::Many,
            };
            seen.push((stage, hits));
            // stage authority: no later stage can override this one
            if hits != StageHits::None {
                break;
            }
        }
        Ok(resolve(&seen))
    }

    async fn observe_name(
        &self,
        account: AccountId,
        name: &str,
        seen: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", ACCOUNT_NAMES, " (account_id, name, last_seen) ",
            "VALUES      ($1, $2, $3) ",
            "ON CONFLICT (account_id, name) DO UPDATE SET last_seen = EXCLUDED.last_seen"
        );
        self.execute(SQL, &[&account, &name, &seen]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_unique_stage_wins() {
        let stages = [
            (Stage::ExactAccount, StageHits::One(7)),
            (Stage::ExactUser, StageHits::Many),
        ];
        assert!(resolve(&stages) == NameMatch::Account(7));
    }

    #[test]
    fn early_ambiguity_is_terminal() {
        let stages = [
            (Stage::ExactAccount, StageHits::Many),
            (Stage::ExactUser, StageHits::One(3)),
        ];
        assert!(resolve(&stages) == NameMatch::AmbiguousName);
    }

    #[test]
    fn empty_stages_fall_through_to_not_found() {
        let stages = [
            (Stage::ExactAccount, StageHits::None),
            (Stage::ExactUser, StageHits::None),
            (Stage::SubAccount, StageHits::None),
            (Stage::SubUser, StageHits::None),
        ];
        assert!(resolve(&stages) == NameMatch::NotFound);
    }

    #[test]
    fn substring_ambiguity_names_its_stage() {
        let stages = [
            (Stage::ExactAccount, StageHits::None),
            (Stage::ExactUser, StageHits::None),
            (Stage::SubAccount, StageHits::Many),
        ];
        assert!(resolve(&stages) == NameMatch::AmbiguousSubnameAccount);
        let stages = [
            (Stage::ExactAccount, StageHits::None),
            (Stage::ExactUser, StageHits::None),
            (Stage::SubAccount, StageHits::None),
            (Stage::SubUser, StageHits::Many),
        ];
        assert!(resolve(&stages) == NameMatch::AmbiguousSubnameUser);
    }

    #[test]
    fn user_first_reorders_authority() {
        let order = Stage::order(true);
        assert!(order[0] == Stage::ExactUser);
        assert!(order[1] == Stage::ExactAccount);
        assert!(order[2] == Stage::SubUser);
        assert!(order[3] == Stage::SubAccount);
    }
}
