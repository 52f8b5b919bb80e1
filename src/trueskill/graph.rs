use super::Gaussian;
use super::Rating;
use super::TrueSkill;
use super::normal;
use std::collections::BTreeMap;

const MIN_DELTA: f64 = 0.0001;
const MAX_SWEEPS: usize = 10;

/// the factor graph behind a single rating update. variables and factors
/// live in flat arenas addressed by index; message passing walks the
/// schedule iteratively, so team count never touches the stack.
///
/// layout per outcome, teams sorted by rank:
///   skill --(prior)--> perf --(sum)--> team perf --(sum)--> pairwise diff
/// with a truncation factor on every adjacent diff enforcing the observed
/// ordering (or the draw margin when ranks tie).
pub struct Graph {
    order: Vec<usize>,
    sizes: Vec<usize>,
    vars: Vec<Variable>,
    factors: Vec<Factor>,
    skills: Vec<Vec<usize>>,
    priors: Vec<usize>,
    likelihoods: Vec<usize>,
    team_sums: Vec<usize>,
    diff_sums: Vec<usize>,
    truncates: Vec<usize>,
}

#[derive(Default)]
struct Variable {
    value: Gaussian,
    messages: BTreeMap<usize, Gaussian>,
}

enum Factor {
    Prior {
        var: usize,
        prior: Gaussian,
    },
    Likelihood {
        mean: usize,
        value: usize,
        variance: f64,
    },
    Sum {
        sum: usize,
        terms: Vec<usize>,
        coeffs: Vec<f64>,
    },
    Truncate {
        var: usize,
        margin: f64,
        draw: bool,
    },
}

impl Variable {
    fn message(&self, factor: usize) -> Gaussian {
        self.messages.get(&factor).copied().unwrap_or_default()
    }
    fn set(&mut self, val: Gaussian) -> f64 {
        let delta = val.delta(&self.value);
        self.value = val;
        delta
    }
    fn update_message(&mut self, factor: usize, message: Gaussian) -> f64 {
        let old = self.message(factor);
        self.messages.insert(factor, message);
        let val = self.value / old * message;
        self.set(val)
    }
    fn update_value(&mut self, factor: usize, value: Gaussian) -> f64 {
        let old = self.message(factor);
        self.messages.insert(factor, value * old / self.value);
        self.set(value)
    }
}

impl Graph {
    pub fn new(env: &TrueSkill, teams: &[Vec<Rating>], ranks: &[usize]) -> Self {
        let mut order = (0..teams.len()).collect::<Vec<_>>();
        order.sort_by_key(|&i| ranks[i]);
        let mut graph = Self {
            order: order.clone(),
            sizes: order.iter().map(|&i| teams[i].len()).collect(),
            vars: Vec::new(),
            factors: Vec::new(),
            skills: Vec::new(),
            priors: Vec::new(),
            likelihoods: Vec::new(),
            team_sums: Vec::new(),
            diff_sums: Vec::new(),
            truncates: Vec::new(),
        };
        let mut team_perfs = Vec::new();
        for &t in &order {
            let mut skill_row = Vec::new();
            let mut perf_row = Vec::new();
            for &player in &teams[t] {
                let skill = graph.variable();
                let perf = graph.variable();
                let sigma = (player.sigma.powi(2) + env.tau.powi(2)).sqrt();
                let prior = Gaussian::from_moments(player.mu, sigma);
                let pid = graph.factor(Factor::Prior { var: skill, prior });
                graph.priors.push(pid);
                let lid = graph.factor(Factor::Likelihood {
                    mean: skill,
                    value: perf,
                    variance: env.beta.powi(2),
                });
                graph.likelihoods.push(lid);
                skill_row.push(skill);
                perf_row.push(perf);
            }
            let team_perf = graph.variable();
            let sid = graph.factor(Factor::Sum {
                sum: team_perf,
                coeffs: vec![1.0; perf_row.len()],
                terms: perf_row,
            });
            graph.team_sums.push(sid);
            graph.skills.push(skill_row);
            team_perfs.push(team_perf);
        }
        let sorted_ranks = order.iter().map(|&i| ranks[i]).collect::<Vec<_>>();
        for pair in 0..order.len() - 1 {
            let diff = graph.variable();
            let did = graph.factor(Factor::Sum {
                sum: diff,
                terms: vec![team_perfs[pair], team_perfs[pair + 1]],
                coeffs: vec![1.0, -1.0],
            });
            graph.diff_sums.push(did);
            let size = graph.sizes[pair] + graph.sizes[pair + 1];
            let tid = graph.factor(Factor::Truncate {
                var: diff,
                margin: env.draw_margin(size),
                draw: sorted_ranks[pair] == sorted_ranks[pair + 1],
            });
            graph.truncates.push(tid);
        }
        graph
    }

    fn variable(&mut self) -> usize {
        self.vars.push(Variable::default());
        self.vars.len() - 1
    }

    fn factor(&mut self, factor: Factor) -> usize {
        self.factors.push(factor);
        self.factors.len() - 1
    }

    /// run the message-passing schedule to convergence: push priors and
    /// performances down once, sweep the inter-team ordering constraints
    /// until quiescent, then propagate back up to the skill variables.
    pub fn converge(mut self) -> Self {
        for fid in self.priors.clone() {
            self.down(fid);
        }
        for fid in self.likelihoods.clone() {
            self.down(fid);
        }
        for fid in self.team_sums.clone() {
            self.down(fid);
        }
        let n = self.diff_sums.len();
        for _ in 0..MAX_SWEEPS {
            let mut delta: f64 = 0.0;
            if n == 1 {
                self.down(self.diff_sums[0]);
                delta = self.up(self.truncates[0], 0);
            } else {
                for z in 0..n - 1 {
                    self.down(self.diff_sums[z]);
                    delta = delta.max(self.up(self.truncates[z], 0));
                    self.up(self.diff_sums[z], 1);
                }
                for z in (1..n).rev() {
                    self.down(self.diff_sums[z]);
                    delta = delta.max(self.up(self.truncates[z], 0));
                    self.up(self.diff_sums[z], 0);
                }
            }
            if delta <= MIN_DELTA {
                break;
            }
        }
        self.up(self.diff_sums[0], 0);
        self.up(self.diff_sums[n - 1], 1);
        for fid in self.team_sums.clone() {
            let arity = match &self.factors[fid] {
                Factor::Sum { terms, .. } => terms.len(),
                _ => unreachable!(),
            };
            for x in 0..arity {
                self.up(fid, x);
            }
        }
        for fid in self.likelihoods.clone() {
            self.up(fid, 0);
        }
        self
    }

    /// updated ratings in the caller's original team order
    pub fn posteriors(&self) -> Vec<Vec<Rating>> {
        let mut out = vec![Vec::new(); self.order.len()];
        for (sorted, &original) in self.order.iter().enumerate() {
            out[original] = self.skills[sorted]
                .iter()
                .map(|&v| Rating::from(self.vars[v].value))
                .collect();
        }
        out
    }
}

// message passing per factor kind
impl Graph {
    fn down(&mut self, fid: usize) -> f64 {
        match &self.factors[fid] {
            Factor::Prior { var, prior } => {
                let (var, prior) = (*var, *prior);
                self.vars[var].update_value(fid, prior)
            }
            Factor::Likelihood {
                mean,
                value,
                variance,
            } => {
                let (mean, value, variance) = (*mean, *value, *variance);
                self.likelihood(fid, mean, value, variance)
            }
            Factor::Sum { sum, terms, coeffs } => {
                let (sum, terms, coeffs) = (*sum, terms.clone(), coeffs.clone());
                self.weighted_sum(fid, sum, &terms, &coeffs)
            }
            Factor::Truncate { .. } => unreachable!("truncation has no downward message"),
        }
    }

    fn up(&mut self, fid: usize, index: usize) -> f64 {
        match &self.factors[fid] {
            Factor::Prior { .. } => unreachable!("priors have no upward message"),
            Factor::Likelihood { mean, value, variance } => {
                let (mean, value, variance) = (*mean, *value, *variance);
                self.likelihood(fid, value, mean, variance)
            }
            Factor::Sum { sum, terms, coeffs } => {
                let (sum, terms, coeffs) = (*sum, terms.clone(), coeffs.clone());
                let pivot = coeffs[index];
                let inverse = coeffs
                    .iter()
                    .enumerate()
                    .map(|(x, &c)| {
                        if pivot == 0.0 {
                            0.0
                        } else if x == index {
                            1.0 / pivot
                        } else {
                            -c / pivot
                        }
                    })
                    .collect::<Vec<_>>();
                let mut sources = terms.clone();
                sources[index] = sum;
                self.weighted_sum(fid, terms[index], &sources, &inverse)
            }
            Factor::Truncate { var, margin, draw } => {
                let (var, margin, draw) = (*var, *margin, *draw);
                self.truncate(fid, var, margin, draw)
            }
        }
    }

    /// message through a performance likelihood, in either direction
    fn likelihood(&mut self, fid: usize, from: usize, to: usize, variance: f64) -> f64 {
        let msg = self.vars[from].value / self.vars[from].message(fid);
        let a = 1.0 / (1.0 + variance * msg.pi);
        let scaled = Gaussian {
            pi: a * msg.pi,
            tau: a * msg.tau,
        };
        self.vars[to].update_message(fid, scaled)
    }

    /// message into `target` through a weighted-sum constraint
    fn weighted_sum(&mut self, fid: usize, target: usize, sources: &[usize], coeffs: &[f64]) -> f64 {
        let mut pi_inv = 0.0;
        let mut mu = 0.0;
        for (&v, &c) in sources.iter().zip(coeffs) {
            let div = self.vars[v].value / self.vars[v].message(fid);
            mu += c * div.mu();
            if pi_inv == f64::INFINITY {
                continue;
            }
            if div.pi == 0.0 {
                pi_inv = f64::INFINITY;
            } else {
                pi_inv += c * c / div.pi;
            }
        }
        let pi = pi_inv.recip();
        let message = Gaussian { pi, tau: pi * mu };
        self.vars[target].update_message(fid, message)
    }

    /// moment-matched truncation enforcing win (or draw) on a difference
    fn truncate(&mut self, fid: usize, var: usize, margin: f64, draw: bool) -> f64 {
        let div = self.vars[var].value / self.vars[var].message(fid);
        let sqrt_pi = div.pi.sqrt();
        let diff = div.tau / sqrt_pi;
        let eps = margin * sqrt_pi;
        let (v, w) = match draw {
            true => (normal::v_draw(diff, eps), normal::w_draw(diff, eps)),
            false => (normal::v_win(diff, eps), normal::w_win(diff, eps)),
        };
        let denom = 1.0 - w;
        let value = Gaussian {
            pi: div.pi / denom,
            tau: (div.tau + sqrt_pi * v) / denom,
        };
        self.vars[var].update_value(fid, value)
    }
}
