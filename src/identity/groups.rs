use super::AccountFacts;
use super::evidence;
use super::evidence::IpItem;
use crate::AccountId;
use crate::UserId;
use petgraph::unionfind::UnionFind;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// deterministic main-account choice: humans before bots, higher rank
/// before lower, then the numerically smallest id
pub fn choose_main_account(facts: &[AccountFacts]) -> AccountId {
    facts
        .iter()
        .min_by_key(|f| (f.bot, std::cmp::Reverse(f.rank), f.account))
        .expect("nonempty group")
        .account
}

/// the same ordering applied to two users' canonical accounts
pub fn choose_main_user(a: AccountFacts, b: AccountFacts) -> UserId {
    choose_main_account(&[a, b])
}

/// everything the split planner needs, snapshotted from the store so the
/// whole algorithm stays pure
#[derive(Debug, Clone)]
pub struct SplitContext {
    pub user: UserId,
    /// the accounts named by the command, here {user, account}
    pub conflict: BTreeSet<AccountId>,
    pub facts: Vec<AccountFacts>,
    /// confirmed (status 1) edges inside the user's account set
    pub confirmed: Vec<(AccountId, AccountId)>,
    /// exact observed addresses per account
    pub exact_ips: BTreeMap<AccountId, BTreeSet<u32>>,
    /// aggregated evidence per account, for the range expansion
    pub evidence: BTreeMap<AccountId, Vec<IpItem>>,
    /// range tolerance in /24 blocks
    pub slack: u32,
}

/// a group leaving the user, with its chosen new canonical account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedGroup {
    pub new_user: UserId,
    pub accounts: BTreeSet<AccountId>,
}

/// the full outcome of the ordered-smurf-groups algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub kept: BTreeSet<AccountId>,
    pub detached: Vec<DetachedGroup>,
}

impl SplitContext {
    fn facts_of(&self, group: &BTreeSet<AccountId>) -> Vec<AccountFacts> {
        self.facts
            .iter()
            .filter(|f| group.contains(&f.account))
            .copied()
            .collect()
    }

    /// mean absolute cpu-fingerprint distance to the canonical account,
    /// over the members that have one
    fn cpu_distance(&self, group: &BTreeSet<AccountId>) -> f64 {
        let Some(anchor) = self
            .facts
            .iter()
            .find(|f| f.account == self.user)
            .and_then(|f| f.cpu)
        else {
            return f64::INFINITY;
        };
        let distances = self
            .facts_of(group)
            .iter()
            .filter_map(|f| f.cpu)
            .map(|cpu| (cpu - anchor).abs() as f64)
            .collect::<Vec<_>>();
        if distances.is_empty() {
            f64::INFINITY
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        }
    }
}

/// run the ordered-smurf-groups algorithm. connected components over
/// confirmed edges partition the user's accounts; conflicting groups are
/// those holding a named account; one group is kept and the rest leave,
/// each taking its IP-evidence dependencies with it.
pub fn plan_split(ctx: &SplitContext) -> SplitPlan {
    let ids = ctx.facts.iter().map(|f| f.account).collect::<Vec<_>>();
    let index = ids
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect::<BTreeMap<_, _>>();
    let mut forest = UnionFind::<usize>::new(ids.len());
    for &(a, b) in &ctx.confirmed {
        if let (Some(&ia), Some(&ib)) = (index.get(&a), index.get(&b)) {
            forest.union(ia, ib);
        }
    }
    let mut components = BTreeMap::<usize, BTreeSet<AccountId>>::new();
    for (i, &id) in ids.iter().enumerate() {
        components.entry(forest.find(i)).or_default().insert(id);
    }
    let groups = components.into_values().collect::<Vec<_>>();
    let conflicting = groups
        .iter()
        .filter(|g| g.iter().any(|id| ctx.conflict.contains(id)))
        .cloned()
        .collect::<Vec<_>>();
    let levels = evidence::true_smurfs_by_ip(ctx.user, &ctx.exact_ips);

    // the first group: canonical's own group if it conflicts, else the
    // conflicting group closest to the canonical account by evidence
    let kept = conflicting
        .iter()
        .find(|g| g.contains(&ctx.user))
        .cloned()
        .unwrap_or_else(|| {
            conflicting
                .iter()
                .min_by(|a, b| rank_group(ctx, &levels, *a, *b))
                .cloned()
                .unwrap_or_default()
        });

    // orphans follow whichever conflicting group reaches them first,
    // the kept group having right of first refusal
    let mut pool = groups
        .iter()
        .filter(|g| !conflicting.contains(*g))
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>();
    let absorbed = attach_dependencies(ctx, &kept, &mut pool);
    let kept = kept.union(&absorbed).copied().collect::<BTreeSet<_>>();

    let mut leaving = conflicting
        .into_iter()
        .filter(|g| !g.iter().any(|id| kept.contains(id)))
        .collect::<Vec<_>>();
    leaving.sort_by_key(|g| choose_main_account(&ctx.facts_of(g)));
    let detached = leaving
        .into_iter()
        .map(|g| {
            let dependencies = attach_dependencies(ctx, &g, &mut pool);
            let accounts = g.union(&dependencies).copied().collect::<BTreeSet<_>>();
            DetachedGroup {
                new_user: choose_main_account(&ctx.facts_of(&accounts)),
                accounts,
            }
        })
        .collect();
    SplitPlan { kept, detached }
}

/// order conflicting groups: nearest minimum BFS level, then largest,
/// then closest cpu fingerprint, then smallest main account id
fn rank_group(
    ctx: &SplitContext,
    levels: &BTreeMap<AccountId, usize>,
    a: &BTreeSet<AccountId>,
    b: &BTreeSet<AccountId>,
) -> std::cmp::Ordering {
    let level = |g: &BTreeSet<AccountId>| {
        g.iter()
            .filter_map(|id| levels.get(id))
            .min()
            .copied()
            .unwrap_or(usize::MAX)
    };
    level(a)
        .cmp(&level(b))
        .then(b.len().cmp(&a.len()))
        .then(
            ctx.cpu_distance(a)
                .partial_cmp(&ctx.cpu_distance(b))
                .unwrap_or(std::cmp::Ordering::Equal),
        )
        .then(choose_main_account(&ctx.facts_of(a)).cmp(&choose_main_account(&ctx.facts_of(b))))
}

/// two-pass dependency attachment: exact-address expansion first, then
/// the aggregated-range expansion, both to fixpoint and both restricted
/// to the unclaimed orphan pool. claimed orphans leave the pool.
fn attach_dependencies(
    ctx: &SplitContext,
    group: &BTreeSet<AccountId>,
    pool: &mut BTreeSet<AccountId>,
) -> BTreeSet<AccountId> {
    let mut attached = BTreeSet::new();
    let mut members = group.clone();
    loop {
        let visible = members
            .iter()
            .filter_map(|id| ctx.exact_ips.get(id))
            .flatten()
            .copied()
            .filter(|&ip| !evidence::reserved(ip))
            .collect::<BTreeSet<_>>();
        let joining = pool
            .iter()
            .filter(|id| {
                ctx.exact_ips
                    .get(*id)
                    .is_some_and(|ips| ips.iter().any(|ip| visible.contains(ip)))
            })
            .copied()
            .collect::<Vec<_>>();
        if joining.is_empty() {
            break;
        }
        for id in joining {
            pool.remove(&id);
            members.insert(id);
            attached.insert(id);
        }
    }
    let candidates = members
        .iter()
        .chain(pool.iter())
        .filter_map(|id| ctx.evidence.get(id).map(|items| (*id, items.clone())))
        .collect::<BTreeMap<_, _>>();
    for id in evidence::probable_smurfs_by_ip(&members, &candidates, ctx.slack) {
        if pool.remove(&id) {
            attached.insert(id);
        }
    }
    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::evidence::ipv4;

    fn facts(account: AccountId, rank: i16, bot: bool) -> AccountFacts {
        AccountFacts {
            account,
            rank,
            bot,
            cpu: None,
        }
    }

    fn ctx(user: UserId, conflict: &[AccountId], accounts: &[AccountFacts]) -> SplitContext {
        SplitContext {
            user,
            conflict: conflict.iter().copied().collect(),
            facts: accounts.to_vec(),
            confirmed: Vec::new(),
            exact_ips: BTreeMap::new(),
            evidence: BTreeMap::new(),
            slack: 4,
        }
    }

    #[test]
    fn main_account_prefers_humans_then_rank_then_id() {
        let group = [facts(5, 7, true), facts(9, 2, false), facts(12, 2, false)];
        assert!(choose_main_account(&group) == 9);
        let bots = [facts(5, 7, true), facts(3, 7, true)];
        assert!(choose_main_account(&bots) == 3);
    }

    #[test]
    fn split_detaches_the_named_account() {
        let mut c = ctx(10, &[10, 30], &[facts(10, 3, false), facts(20, 1, false), facts(30, 0, false)]);
        // 20 shares an address with 10; 30 shares only with 20
        c.exact_ips = BTreeMap::from([
            (10, BTreeSet::from([ipv4(5, 5, 5, 5)])),
            (20, BTreeSet::from([ipv4(5, 5, 5, 5), ipv4(6, 6, 6, 6)])),
            (30, BTreeSet::from([ipv4(7, 7, 7, 7)])),
        ]);
        let plan = plan_split(&c);
        assert!(plan.kept == BTreeSet::from([10, 20]));
        assert!(plan.detached.len() == 1);
        assert!(plan.detached[0].accounts == BTreeSet::from([30]));
        assert!(plan.detached[0].new_user == 30);
    }

    #[test]
    fn orphan_follows_its_ip_neighbour_out() {
        let mut c = ctx(10, &[10, 30], &[facts(10, 3, false), facts(20, 1, false), facts(30, 0, false)]);
        // 20 shares an address with 30, none with 10
        c.exact_ips = BTreeMap::from([
            (10, BTreeSet::from([ipv4(5, 5, 5, 5)])),
            (20, BTreeSet::from([ipv4(6, 6, 6, 6)])),
            (30, BTreeSet::from([ipv4(6, 6, 6, 6)])),
        ]);
        let plan = plan_split(&c);
        assert!(plan.kept == BTreeSet::from([10]));
        assert!(plan.detached.len() == 1);
        assert!(plan.detached[0].accounts == BTreeSet::from([20, 30]));
        // the orphan outranks the named account on rank
        assert!(plan.detached[0].new_user == 20);
    }

    #[test]
    fn kept_group_claims_orphans_first() {
        let mut c = ctx(10, &[10, 30], &[facts(10, 3, false), facts(20, 1, false), facts(30, 0, false)]);
        // 20 is one hop from both sides; the kept group wins it
        c.exact_ips = BTreeMap::from([
            (10, BTreeSet::from([ipv4(5, 5, 5, 5)])),
            (20, BTreeSet::from([ipv4(5, 5, 5, 5), ipv4(6, 6, 6, 6)])),
            (30, BTreeSet::from([ipv4(6, 6, 6, 6)])),
        ]);
        let plan = plan_split(&c);
        assert!(plan.kept == BTreeSet::from([10, 20]));
        assert!(plan.detached[0].accounts == BTreeSet::from([30]));
    }

    #[test]
    fn confirmed_edges_keep_groups_whole() {
        let mut c = ctx(
            10,
            &[10, 30],
            &[
                facts(10, 3, false),
                facts(20, 1, false),
                facts(30, 0, false),
                facts(40, 0, false),
            ],
        );
        c.confirmed = vec![(30, 40)];
        let plan = plan_split(&c);
        assert!(plan.kept.contains(&10));
        assert!(plan.detached.len() == 1);
        assert!(plan.detached[0].accounts == BTreeSet::from([30, 40]));
        assert!(plan.detached[0].new_user == 30);
    }

    #[test]
    fn range_evidence_attaches_remaining_orphans() {
        let mut c = ctx(10, &[10, 30], &[facts(10, 3, false), facts(20, 1, false), facts(30, 0, false)]);
        c.exact_ips = BTreeMap::from([(10, BTreeSet::from([ipv4(5, 5, 5, 5)]))]);
        c.evidence = BTreeMap::from([
            (20, vec![IpItem::Exact(ipv4(90, 0, 2, 8))]),
            (30, vec![IpItem::Range(ipv4(90, 0, 0, 0), ipv4(90, 0, 3, 255))]),
        ]);
        let plan = plan_split(&c);
        assert!(plan.detached[0].accounts == BTreeSet::from([20, 30]));
    }

    #[test]
    fn bot_groups_lose_the_canonical_choice() {
        let group = [facts(2, 7, true), facts(50, 0, false)];
        assert!(choose_main_account(&group) == 50);
    }
}
