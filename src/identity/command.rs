use super::EdgeOrigin;
use super::JoinContext;
use super::JoinPlan;
use super::SmurfEdge;
use super::SmurfStatus;
use super::SplitContext;
use super::SplitPlan;
use super::evidence;
use super::groups;
use crate::AccountId;
use crate::GameId;
use crate::UserId;
use crate::config::Config;
use crate::ledger;
use crate::ledger::EventOrigin;
use crate::ledger::EventPayload;
use crate::rating::RerateRequest;
use crate::store::Identity;
use crate::store::Matches;
use crate::store::Requests;
use crate::store::StoreError;
use crate::store::atomically;
use std::collections::BTreeSet;
use tokio_postgres::Client;

/// how many conflicting matches a refused join reports
const REPORTED_CONFLICTS: i64 = 10;

/// modifier flags shared by the identity commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub force: bool,
    pub sticky: bool,
    pub test: bool,
}

/// a user-correctable rejection; bad input, not a fault
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("id {0} is not a user id")]
    NotAUser(i32),
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("account {account} does not belong to user {user}")]
    AccountNotOwned { user: UserId, account: AccountId },
    #[error("account {0} is the canonical account and cannot be split off")]
    AccountIsCanonical(AccountId),
    #[error("cannot join a user with itself")]
    SameUser,
    #[error("{0} not-smurf edge(s) between these users; re-run with force to override")]
    NotSmurfBlocked(usize),
    #[error("users played {} ratable match(es) together; re-run with force to override", .games.len())]
    SimultaneousPlay { games: Vec<GameId> },
    #[error("accounts {a} and {b} carry a confirmed smurf edge")]
    ConfirmedBlocked { a: AccountId, b: AccountId },
    #[error("accounts {a} and {b} already belong to the same user")]
    SameUserAccounts { a: AccountId, b: AccountId },
    #[error("user name {0:?} is invalid (1 to 24 characters)")]
    BadName(String),
    #[error("user name {0:?} is already taken")]
    NameTaken(String),
}

/// command outcome: refusals are typed results, inconsistencies abort
/// with no mutation, store faults bubble
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Refused(#[from] Refusal),
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Inconsistent(message) => Self::Inconsistent(message),
            other => Self::Store(other),
        }
    }
}

/// the identity command vocabulary, one variant per admin action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join {
        u1: i32,
        u2: i32,
        flags: Flags,
    },
    Split {
        user: i32,
        account: AccountId,
        flags: Flags,
    },
    ProbableSmurf {
        a1: AccountId,
        a2: AccountId,
    },
    NotSmurf {
        a1: AccountId,
        a2: AccountId,
    },
    SetName {
        user: i32,
        name: String,
    },
}

/// what a successful command reports back
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Joined {
        main: UserId,
        child: UserId,
        rerates: usize,
    },
    JoinPlanned(JoinPlan),
    Split(SplitPlan),
    SplitPlanned(SplitPlan),
    Edge {
        a: AccountId,
        b: AccountId,
        status: SmurfStatus,
    },
    Renamed {
        user: UserId,
        old: String,
        new: String,
    },
}

/// the caller's identity, threaded into every event the command emits
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub origin: EventOrigin,
    pub origin_id: i32,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            origin: EventOrigin::Admin,
            origin_id: 0,
        }
    }
}

/// single dispatch point over the command sum type
pub async fn dispatch(
    client: &Client,
    cfg: &Config,
    actor: Actor,
    command: Command,
) -> Result<Reply, CommandError> {
    match command {
        Command::Join { u1, u2, flags } => join(client, cfg, actor, u1, u2, flags).await,
        Command::Split {
            user,
            account,
            flags,
        } => split(client, cfg, actor, user, account, flags).await,
        Command::ProbableSmurf { a1, a2 } => {
            edge_command(client, actor, a1, a2, SmurfStatus::Probable).await
        }
        Command::NotSmurf { a1, a2 } => {
            edge_command(client, actor, a1, a2, SmurfStatus::NotSmurf).await
        }
        Command::SetName { user, name } => set_name(client, actor, user, name).await,
    }
}

/// merge two users. checks run on a snapshot, mutation runs in one
/// transaction, and every moved account is queued for re-rating.
pub async fn join(
    client: &Client,
    cfg: &Config,
    actor: Actor,
    u1: i32,
    u2: i32,
    flags: Flags,
) -> Result<Reply, CommandError> {
    if u1 == u2 {
        return Err(Refusal::SameUser.into());
    }
    for id in [u1, u2] {
        if !client.is_user(id).await? {
            return Err(Refusal::NotAUser(id).into());
        }
    }
    let accounts1 = client.accounts_of(u1).await?;
    let accounts2 = client.accounts_of(u2).await?;
    let facts1 = canonical_facts(client, u1).await?;
    let facts2 = canonical_facts(client, u2).await?;
    let cross = client.edges_between(&accounts1, &accounts2).await?;
    let shared = client
        .shared_matches(
            &accounts1.iter().copied().collect::<Vec<_>>(),
            &accounts2.iter().copied().collect::<Vec<_>>(),
            REPORTED_CONFLICTS,
        )
        .await?;
    let ctx = JoinContext {
        u1,
        u2,
        facts1,
        facts2,
        accounts1,
        accounts2,
        cross,
        shared,
    };
    let plan = super::plan_join(&ctx, flags)?;
    if flags.test {
        return Ok(Reply::JoinPlanned(plan));
    }
    let now = chrono::Utc::now().timestamp();
    let rerates = plan.moving.len();
    atomically(client, async {
        for edge in &plan.dropped {
            let payload = match edge.status {
                SmurfStatus::NotSmurf => EventPayload::DelNotSmurf {
                    account_id1: edge.id1,
                    account_id2: edge.id2,
                },
                _ => EventPayload::DelProbSmurf {
                    account_id1: edge.id1,
                    account_id2: edge.id2,
                },
            };
            ledger::record(client, &payload, 0, actor.origin, actor.origin_id, None).await?;
            client.drop_edge(edge.id1, edge.id2).await?;
        }
        let payload = EventPayload::JoinAcc {
            main_user_id: plan.main,
            child_user_id: plan.child,
        };
        ledger::record(
            client,
            &payload,
            plan.merge_status,
            actor.origin,
            actor.origin_id,
            None,
        )
        .await?;
        for &account in &plan.moving {
            client
                .append_rerate(&RerateRequest::Account { account }, now)
                .await?;
        }
        client.reassign(&plan.moving, plan.main).await?;
        if flags.sticky {
            // source semantics: the edge goes between the original
            // command parameters, not the chosen main
            client
                .put_edge(SmurfEdge::new(
                    u1,
                    u2,
                    SmurfStatus::Confirmed,
                    EdgeOrigin::Admin,
                ))
                .await?;
        }
        Ok(())
    })
    .await?;
    refresh_user_ips(client, cfg, plan.main).await?;
    Ok(Reply::Joined {
        main: plan.main,
        child: plan.child,
        rerates,
    })
}

/// split an account (and its evidence dependencies) off a user
pub async fn split(
    client: &Client,
    cfg: &Config,
    actor: Actor,
    user: i32,
    account: AccountId,
    flags: Flags,
) -> Result<Reply, CommandError> {
    if !client.is_user(user).await? {
        return Err(Refusal::NotAUser(user).into());
    }
    if account == user {
        return Err(Refusal::AccountIsCanonical(account).into());
    }
    match client.lookup_user_id(account).await? {
        None => return Err(Refusal::UnknownAccount(account).into()),
        Some(owner) if owner != user => {
            return Err(Refusal::AccountNotOwned { user, account }.into());
        }
        Some(_) => {}
    }
    if let Some(edge) = client.edge(user, account).await? {
        match edge.status {
            SmurfStatus::Confirmed if !flags.force => {
                return Err(Refusal::ConfirmedBlocked {
                    a: edge.id1,
                    b: edge.id2,
                }
                .into());
            }
            SmurfStatus::Confirmed => {}
            other => {
                return Err(CommandError::Inconsistent(format!(
                    "{:?} edge between accounts {} and {} of one user",
                    other, edge.id1, edge.id2
                )));
            }
        }
    }
    let ctx = split_context(client, cfg, user, account).await?;
    let plan = groups::plan_split(&ctx);
    if flags.test {
        return Ok(Reply::SplitPlanned(plan));
    }
    if plan.detached.is_empty() {
        log::warn!(
            "split of account {} from user {} detaches nothing",
            account,
            user
        );
        return Ok(Reply::Split(plan));
    }
    let now = chrono::Utc::now().timestamp();
    atomically(client, async {
        for group in &plan.detached {
            let name = client
                .last_account_name(group.new_user)
                .await?
                .unwrap_or_else(|| format!("user{}", group.new_user));
            client.upsert_user(group.new_user, &name).await?;
            for &moved in &group.accounts {
                let payload = EventPayload::SplitAcc {
                    old_user_id: user,
                    new_user_id: group.new_user,
                    account_id: moved,
                };
                let sub_type = if moved == group.new_user { 0 } else { 1 };
                ledger::record(client, &payload, sub_type, actor.origin, actor.origin_id, None)
                    .await?;
                client
                    .append_rerate(&RerateRequest::Account { account: moved }, now)
                    .await?;
            }
            client.reassign(&group.accounts, group.new_user).await?;
        }
        if flags.sticky {
            client
                .put_edge(SmurfEdge::new(
                    user,
                    account,
                    SmurfStatus::NotSmurf,
                    EdgeOrigin::Admin,
                ))
                .await?;
        }
        Ok(())
    })
    .await?;
    refresh_user_ips(client, cfg, user).await?;
    for group in &plan.detached {
        refresh_user_ips(client, cfg, group.new_user).await?;
    }
    Ok(Reply::Split(plan))
}

/// manual probable-smurf / not-smurf edge maintenance
async fn edge_command(
    client: &Client,
    actor: Actor,
    a1: AccountId,
    a2: AccountId,
    status: SmurfStatus,
) -> Result<Reply, CommandError> {
    let Some(owner1) = client.lookup_user_id(a1).await? else {
        return Err(Refusal::UnknownAccount(a1).into());
    };
    let Some(owner2) = client.lookup_user_id(a2).await? else {
        return Err(Refusal::UnknownAccount(a2).into());
    };
    if owner1 == owner2 {
        return Err(Refusal::SameUserAccounts { a: a1, b: a2 }.into());
    }
    let existing = client.edge(a1, a2).await?;
    if let Some(edge) = existing {
        if edge.status == SmurfStatus::Confirmed {
            return Err(Refusal::ConfirmedBlocked {
                a: edge.id1,
                b: edge.id2,
            }
            .into());
        }
        if edge.status == status {
            return Ok(Reply::Edge {
                a: edge.id1,
                b: edge.id2,
                status,
            });
        }
    }
    let edge = SmurfEdge::new(a1, a2, status, EdgeOrigin::Admin);
    atomically(client, async {
        if let Some(replaced) = existing {
            let removal = match replaced.status {
                SmurfStatus::NotSmurf => EventPayload::DelNotSmurf {
                    account_id1: replaced.id1,
                    account_id2: replaced.id2,
                },
                _ => EventPayload::DelProbSmurf {
                    account_id1: replaced.id1,
                    account_id2: replaced.id2,
                },
            };
            ledger::record(client, &removal, 0, actor.origin, actor.origin_id, None).await?;
        }
        let addition = match status {
            SmurfStatus::NotSmurf => EventPayload::AddNotSmurf {
                account_id1: edge.id1,
                account_id2: edge.id2,
            },
            _ => EventPayload::AddProbSmurf {
                account_id1: edge.id1,
                account_id2: edge.id2,
            },
        };
        ledger::record(client, &addition, 0, actor.origin, actor.origin_id, None).await?;
        client.put_edge(edge).await?;
        Ok(())
    })
    .await?;
    Ok(Reply::Edge {
        a: edge.id1,
        b: edge.id2,
        status,
    })
}

/// rename a user, audited through the ledger
async fn set_name(
    client: &Client,
    actor: Actor,
    user: i32,
    name: String,
) -> Result<Reply, CommandError> {
    if !client.is_user(user).await? {
        return Err(Refusal::NotAUser(user).into());
    }
    if name.is_empty() || name.chars().count() > 24 {
        return Err(Refusal::BadName(name).into());
    }
    let old = client.user_name(user).await?.unwrap_or_default();
    if old == name {
        return Ok(Reply::Renamed {
            user,
            old: old.clone(),
            new: old,
        });
    }
    let outcome = atomically(client, async {
        let payload = EventPayload::UpdUserDetails {
            updated_user_id: user,
            updated_param: "name".to_string(),
            old_value: old.clone(),
            new_value: name.clone(),
        };
        ledger::record(client, &payload, 0, actor.origin, actor.origin_id, None).await?;
        client.rename_user(user, &name).await?;
        Ok(())
    })
    .await;
    match outcome {
        Ok(()) => Ok(Reply::Renamed {
            user,
            old,
            new: name,
        }),
        Err(StoreError::Constraint(_)) => Err(Refusal::NameTaken(name).into()),
        Err(other) => Err(other.into()),
    }
}

/// facts about a user's canonical account
async fn canonical_facts(client: &Client, user: UserId) -> Result<super::AccountFacts, StoreError> {
    let mut facts = client
        .account_facts(&BTreeSet::from([user]))
        .await?;
    Ok(facts.remove(0))
}

/// snapshot everything the split planner reads
async fn split_context(
    client: &Client,
    cfg: &Config,
    user: UserId,
    account: AccountId,
) -> Result<SplitContext, StoreError> {
    let accounts = client.accounts_of(user).await?;
    let facts = client.account_facts(&accounts).await?;
    let confirmed = client
        .edges_among(&accounts)
        .await?
        .into_iter()
        .filter(|e| e.status == SmurfStatus::Confirmed)
        .map(|e| (e.id1, e.id2))
        .collect();
    let exact_ips = client.observed_ips(&accounts).await?;
    let evidence_items = exact_ips
        .iter()
        .map(|(&id, ips)| {
            (
                id,
                evidence::aggregate(ips, cfg.dyn_ip_threshold, cfg.dyn_ip_range),
            )
        })
        .collect();
    Ok(SplitContext {
        user,
        conflict: BTreeSet::from([user, account]),
        facts,
        confirmed,
        exact_ips,
        evidence: evidence_items,
        slack: cfg.dyn_ip_range,
    })
}

/// recompute a user's aggregated evidence and nb_ips summary
pub async fn refresh_user_ips(
    client: &Client,
    cfg: &Config,
    user: UserId,
) -> Result<(), StoreError> {
    let accounts = client.accounts_of(user).await?;
    let observed = client.observed_ips(&accounts).await?;
    let all = observed.values().flatten().copied().collect::<BTreeSet<_>>();
    let items = evidence::aggregate(&all, cfg.dyn_ip_threshold, cfg.dyn_ip_range);
    let ranges = items
        .iter()
        .map(|item| match item {
            evidence::IpItem::Exact(ip) => (*ip, *ip),
            evidence::IpItem::Range(start, end) => (*start, *end),
        })
        .collect::<Vec<_>>();
    client.set_user_ips(user, &ranges).await
}
