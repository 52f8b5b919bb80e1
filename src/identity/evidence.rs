use crate::AccountId;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// reserved IPv4 space, excluded from all smurf evidence
const RESERVED: [(u32, u32); 14] = [
    (0x00000000, 8),  // 0.0.0.0/8
    (0x0A000000, 8),  // 10.0.0.0/8
    (0x64400000, 10), // 100.64.0.0/10
    (0x7F000000, 8),  // 127.0.0.0/8
    (0xA9FE0000, 16), // 169.254.0.0/16
    (0xAC100000, 12), // 172.16.0.0/12
    (0xC0000000, 24), // 192.0.0.0/24
    (0xC0000200, 24), // 192.0.2.0/24
    (0xC0A80000, 16), // 192.168.0.0/16
    (0xC6120000, 15), // 198.18.0.0/15
    (0xC6336400, 24), // 198.51.100.0/24
    (0xCB007100, 24), // 203.0.113.0/24
    (0xE0000000, 4),  // 224.0.0.0/4
    (0xFFFFFFFF, 32), // 255.255.255.255
];

pub fn reserved(ip: u32) -> bool {
    RESERVED
        .iter()
        .any(|&(base, prefix)| ip >> (32 - prefix) == base >> (32 - prefix))
}

pub fn ipv4(a: u8, b: u8, c: u8, d: u8) -> u32 {
    u32::from_be_bytes([a, b, c, d])
}

/// a piece of stored IP evidence: one address, or one block-aligned span
/// of collapsed /24 neighbourhoods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IpItem {
    Exact(u32),
    Range(u32, u32),
}

impl IpItem {
    fn block_span(&self) -> (u32, u32) {
        match self {
            IpItem::Exact(ip) => (ip >> 8, ip >> 8),
            IpItem::Range(start, end) => (start >> 8, end >> 8),
        }
    }
}

/// aggregate an account's observed addresses for storage. small sets are
/// kept exact; larger ones collapse /24 blocks within `span` blocks of
/// each other into ranges, capped at `threshold` stored items.
pub fn aggregate(ips: &BTreeSet<u32>, threshold: usize, span: u32) -> Vec<IpItem> {
    let kept = ips.iter().copied().filter(|&ip| !reserved(ip)).collect::<Vec<_>>();
    if kept.len() < threshold {
        return kept.into_iter().map(IpItem::Exact).collect();
    }
    let mut items = Vec::new();
    let mut group: Vec<u32> = Vec::new();
    for ip in kept {
        match group.last() {
            Some(&prev) if (ip >> 8).saturating_sub(prev >> 8) <= span => group.push(ip),
            Some(_) => {
                items.push(collapse(&group));
                group = vec![ip];
            }
            None => group.push(ip),
        }
    }
    if !group.is_empty() {
        items.push(collapse(&group));
    }
    items.truncate(threshold);
    items
}

fn collapse(group: &[u32]) -> IpItem {
    match group {
        [single] => IpItem::Exact(*single),
        many => {
            let first = *many.first().expect("nonempty group");
            let last = *many.last().expect("nonempty group");
            IpItem::Range(first & !0xFFu32, last | 0xFFu32)
        }
    }
}

/// whether two pieces of evidence tie their owners together: overlapping
/// ranges (with `slack` blocks of tolerance), or an exact address inside
/// a range. exact-on-exact equality is true-smurf evidence and handled
/// by the exact BFS instead.
pub fn linked(a: &IpItem, b: &IpItem, slack: u32) -> bool {
    match (a, b) {
        (IpItem::Range(..), IpItem::Range(..)) => {
            let (s1, e1) = a.block_span();
            let (s2, e2) = b.block_span();
            s1 <= e2.saturating_add(slack) && s2 <= e1.saturating_add(slack)
        }
        (IpItem::Exact(ip), IpItem::Range(start, end))
        | (IpItem::Range(start, end), IpItem::Exact(ip)) => start <= ip && ip <= end,
        (IpItem::Exact(_), IpItem::Exact(_)) => false,
    }
}

/// breadth-first expansion over shared exact addresses. the frontier
/// starts at the canonical account; any candidate sharing an address
/// with the frontier joins at the next level. returns the level of every
/// reached account, zero for the origin.
pub fn true_smurfs_by_ip(
    origin: AccountId,
    candidates: &BTreeMap<AccountId, BTreeSet<u32>>,
) -> BTreeMap<AccountId, usize> {
    let mut levels = BTreeMap::from([(origin, 0)]);
    let mut frontier = vec![origin];
    let mut level = 0;
    while !frontier.is_empty() {
        level += 1;
        let visible = frontier
            .iter()
            .filter_map(|id| candidates.get(id))
            .flatten()
            .copied()
            .filter(|&ip| !reserved(ip))
            .collect::<BTreeSet<_>>();
        frontier = candidates
            .iter()
            .filter(|(id, _)| !levels.contains_key(*id))
            .filter(|(_, ips)| ips.iter().any(|ip| visible.contains(ip)))
            .map(|(&id, _)| id)
            .collect();
        for &id in &frontier {
            levels.insert(id, level);
        }
    }
    levels
}

/// frontier expansion over aggregated evidence, to fixpoint. seeds stay
/// out of the result; only newly reached candidates are returned.
pub fn probable_smurfs_by_ip(
    seeds: &BTreeSet<AccountId>,
    candidates: &BTreeMap<AccountId, Vec<IpItem>>,
    slack: u32,
) -> BTreeSet<AccountId> {
    let mut reached = seeds.clone();
    let mut frontier = seeds.iter().copied().collect::<Vec<_>>();
    while !frontier.is_empty() {
        let evidence = frontier
            .iter()
            .filter_map(|id| candidates.get(id))
            .flatten()
            .copied()
            .collect::<Vec<_>>();
        frontier = candidates
            .iter()
            .filter(|(id, _)| !reached.contains(*id))
            .filter(|(_, items)| {
                items
                    .iter()
                    .any(|item| evidence.iter().any(|seen| linked(item, seen, slack)))
            })
            .map(|(&id, _)| id)
            .collect();
        reached.extend(frontier.iter().copied());
    }
    seeds.iter().for_each(|id| {
        reached.remove(id);
    });
    reached
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_space_is_recognised() {
        assert!(reserved(ipv4(10, 1, 2, 3)));
        assert!(reserved(ipv4(127, 0, 0, 1)));
        assert!(reserved(ipv4(192, 168, 4, 20)));
        assert!(reserved(ipv4(172, 31, 255, 255)));
        assert!(reserved(ipv4(100, 127, 0, 1)));
        assert!(reserved(ipv4(198, 19, 0, 1)));
        assert!(reserved(ipv4(224, 0, 0, 251)));
        assert!(reserved(ipv4(255, 255, 255, 255)));
        assert!(!reserved(ipv4(8, 8, 8, 8)));
        assert!(!reserved(ipv4(172, 32, 0, 1)));
        assert!(!reserved(ipv4(100, 128, 0, 1)));
    }

    #[test]
    fn small_sets_stay_exact() {
        let ips = BTreeSet::from([ipv4(8, 8, 8, 8), ipv4(9, 9, 9, 9)]);
        let items = aggregate(&ips, 16, 4);
        assert!(items == vec![IpItem::Exact(ipv4(8, 8, 8, 8)), IpItem::Exact(ipv4(9, 9, 9, 9))]);
    }

    #[test]
    fn reserved_addresses_never_become_evidence() {
        let ips = BTreeSet::from([ipv4(10, 0, 0, 1), ipv4(8, 8, 8, 8)]);
        let items = aggregate(&ips, 16, 4);
        assert!(items == vec![IpItem::Exact(ipv4(8, 8, 8, 8))]);
    }

    #[test]
    fn dense_sets_collapse_into_block_ranges() {
        let ips = (0..8u8)
            .map(|block| ipv4(93, 184, block, 1))
            .chain(std::iter::once(ipv4(8, 8, 8, 8)))
            .collect::<BTreeSet<_>>();
        let items = aggregate(&ips, 4, 4);
        assert!(items.len() <= 4);
        assert!(items.contains(&IpItem::Exact(ipv4(8, 8, 8, 8))));
        assert!(
            items.contains(&IpItem::Range(ipv4(93, 184, 0, 0), ipv4(93, 184, 7, 255))),
            "{:?}",
            items
        );
    }

    #[test]
    fn stored_count_caps_at_threshold() {
        let ips = (0..32u8)
            .map(|host| ipv4(80u8.wrapping_add(host), 1, 1, 1))
            .collect::<BTreeSet<_>>();
        let items = aggregate(&ips, 4, 4);
        assert!(items.len() == 4);
    }

    #[test]
    fn exact_bfs_levels_by_distance() {
        // a shares with origin; b shares only with a; c is unreachable
        let candidates = BTreeMap::from([
            (1, BTreeSet::from([ipv4(5, 5, 5, 5), ipv4(6, 6, 6, 6)])),
            (2, BTreeSet::from([ipv4(6, 6, 6, 6), ipv4(7, 7, 7, 7)])),
            (3, BTreeSet::from([ipv4(7, 7, 7, 7)])),
            (4, BTreeSet::from([ipv4(9, 9, 9, 9)])),
        ]);
        let levels = true_smurfs_by_ip(1, &candidates);
        assert!(levels[&1] == 0);
        assert!(levels[&2] == 1);
        assert!(levels[&3] == 2);
        assert!(!levels.contains_key(&4));
    }

    #[test]
    fn shared_reserved_addresses_prove_nothing() {
        let candidates = BTreeMap::from([
            (1, BTreeSet::from([ipv4(192, 168, 1, 1)])),
            (2, BTreeSet::from([ipv4(192, 168, 1, 1)])),
        ]);
        let levels = true_smurfs_by_ip(1, &candidates);
        assert!(!levels.contains_key(&2));
    }

    #[test]
    fn probable_expansion_reaches_through_ranges() {
        let candidates = BTreeMap::from([
            (1, vec![IpItem::Range(ipv4(90, 0, 0, 0), ipv4(90, 0, 3, 255))]),
            // range within slack of account 1's range
            (2, vec![IpItem::Range(ipv4(90, 0, 6, 0), ipv4(90, 0, 8, 255))]),
            // exact address inside account 2's range
            (3, vec![IpItem::Exact(ipv4(90, 0, 7, 12))]),
            // exact address near nothing
            (4, vec![IpItem::Exact(ipv4(120, 0, 0, 1))]),
        ]);
        let seeds = BTreeSet::from([1]);
        let reached = probable_smurfs_by_ip(&seeds, &candidates, 4);
        assert!(reached == BTreeSet::from([2, 3]));
    }

    #[test]
    fn exact_pairs_are_not_probable_evidence() {
        let candidates = BTreeMap::from([
            (1, vec![IpItem::Exact(ipv4(90, 0, 0, 1))]),
            (2, vec![IpItem::Exact(ipv4(90, 0, 0, 1))]),
        ]);
        let seeds = BTreeSet::from([1]);
        assert!(probable_smurfs_by_ip(&seeds, &candidates, 4).is_empty());
    }
}
