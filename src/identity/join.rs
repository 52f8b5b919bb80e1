use super::AccountFacts;
use super::Flags;
use super::Refusal;
use super::SmurfEdge;
use super::SmurfStatus;
use super::choose_main_user;
use super::command::CommandError;
use crate::AccountId;
use crate::GameId;
use crate::UserId;
use std::collections::BTreeSet;

/// everything the join pre-checks need, snapshotted from the store
#[derive(Debug, Clone)]
pub struct JoinContext {
    pub u1: UserId,
    pub u2: UserId,
    pub facts1: AccountFacts,
    pub facts2: AccountFacts,
    pub accounts1: BTreeSet<AccountId>,
    pub accounts2: BTreeSet<AccountId>,
    /// edges spanning the two account sets
    pub cross: Vec<SmurfEdge>,
    /// ratable matches both users appear in, capped at ten
    pub shared: Vec<GameId>,
}

/// the decided merge: who absorbs whom, which edges fall, and the
/// subtype recording what the edges said before the merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    pub main: UserId,
    pub child: UserId,
    pub merge_status: i16,
    pub dropped: Vec<SmurfEdge>,
    pub moving: BTreeSet<AccountId>,
}

/// run the join pre-checks and decide the merge. a confirmed edge
/// between separate users is a data inconsistency no flag overrides;
/// not-smurf edges and simultaneous play yield to `force`.
pub fn plan_join(ctx: &JoinContext, flags: Flags) -> Result<JoinPlan, CommandError> {
    if let Some(edge) = ctx
        .cross
        .iter()
        .find(|e| e.status == SmurfStatus::Confirmed)
    {
        return Err(CommandError::Inconsistent(format!(
            "accounts {} and {} are confirmed smurfs across separate users",
            edge.id1, edge.id2
        )));
    }
    let not_smurfs = ctx
        .cross
        .iter()
        .filter(|e| e.status == SmurfStatus::NotSmurf)
        .count();
    if not_smurfs > 0 && !flags.force {
        return Err(Refusal::NotSmurfBlocked(not_smurfs).into());
    }
    if !ctx.shared.is_empty() && !flags.force {
        return Err(Refusal::SimultaneousPlay {
            games: ctx.shared.clone(),
        }
        .into());
    }
    let probables = ctx
        .cross
        .iter()
        .any(|e| e.status == SmurfStatus::Probable);
    let merge_status = if not_smurfs > 0 {
        0
    } else if probables {
        2
    } else {
        1
    };
    let main = choose_main_user(ctx.facts1, ctx.facts2);
    let child = if main == ctx.u1 { ctx.u2 } else { ctx.u1 };
    let moving = if child == ctx.u1 {
        ctx.accounts1.clone()
    } else {
        ctx.accounts2.clone()
    };
    Ok(JoinPlan {
        main,
        child,
        merge_status,
        dropped: ctx.cross.clone(),
        moving,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EdgeOrigin;

    fn facts(account: AccountId, rank: i16, bot: bool) -> AccountFacts {
        AccountFacts {
            account,
            rank,
            bot,
            cpu: None,
        }
    }

    fn ctx(u1: UserId, u2: UserId) -> JoinContext {
        JoinContext {
            u1,
            u2,
            facts1: facts(u1, 3, false),
            facts2: facts(u2, 1, false),
            accounts1: BTreeSet::from([u1]),
            accounts2: BTreeSet::from([u2, u2 + 1]),
            cross: Vec::new(),
            shared: Vec::new(),
        }
    }

    #[test]
    fn higher_rank_absorbs_lower() {
        let plan = plan_join(&ctx(10, 20), Flags::default()).expect("clean join");
        assert!(plan.main == 10);
        assert!(plan.child == 20);
        assert!(plan.moving == BTreeSet::from([20, 21]));
        assert!(plan.merge_status == 1);
    }

    #[test]
    fn confirmed_cross_edge_is_an_inconsistency_even_forced() {
        let mut c = ctx(10, 20);
        c.cross = vec![SmurfEdge::new(10, 20, SmurfStatus::Confirmed, EdgeOrigin::Admin)];
        let forced = Flags {
            force: true,
            ..Flags::default()
        };
        assert!(matches!(
            plan_join(&c, forced),
            Err(CommandError::Inconsistent(_))
        ));
    }

    #[test]
    fn not_smurf_edges_block_without_force() {
        let mut c = ctx(10, 20);
        c.cross = vec![SmurfEdge::new(10, 21, SmurfStatus::NotSmurf, EdgeOrigin::Admin)];
        assert!(matches!(
            plan_join(&c, Flags::default()),
            Err(CommandError::Refused(Refusal::NotSmurfBlocked(1)))
        ));
        let plan = plan_join(
            &c,
            Flags {
                force: true,
                ..Flags::default()
            },
        )
        .expect("forced join");
        assert!(plan.merge_status == 0);
        assert!(plan.dropped.len() == 1);
    }

    #[test]
    fn simultaneous_play_blocks_without_force() {
        let mut c = ctx(10, 20);
        c.shared = vec![77, 78];
        match plan_join(&c, Flags::default()) {
            Err(CommandError::Refused(Refusal::SimultaneousPlay { games })) => {
                assert!(games == vec![77, 78]);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn probable_edges_colour_the_merge_status() {
        let mut c = ctx(10, 20);
        c.cross = vec![SmurfEdge::new(10, 20, SmurfStatus::Probable, EdgeOrigin::Auto)];
        let plan = plan_join(&c, Flags::default()).expect("probable edges never block");
        assert!(plan.merge_status == 2);
    }

    #[test]
    fn bots_never_become_the_main_user() {
        let mut c = ctx(10, 20);
        c.facts1 = facts(10, 7, true);
        let plan = plan_join(&c, Flags::default()).expect("clean join");
        assert!(plan.main == 20);
        assert!(plan.moving == BTreeSet::from([10]));
    }
}
