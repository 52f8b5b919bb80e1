use crate::rating::PenaltyPolicy;
use crate::rating::StartSkills;
use crate::trueskill::TrueSkill;

/// one recognised game mod: a short name for storage plus the pattern
/// its reported mod names match
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSpec {
    pub short_name: String,
    pub regex: String,
}

/// the full recognised configuration surface, deserialised from a JSON
/// file; every key has a default so a missing file runs the stock setup
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub trueskill_mu: f64,
    pub trueskill_sigma: f64,
    pub trueskill_beta: f64,
    pub trueskill_tau: f64,
    pub trueskill_draw_prob: f64,
    pub inactivity_penalty: PenaltyPolicy,
    /// seconds of quiet before a pending batch re-rate executes
    pub rerate_delay: i64,
    /// engine self-restart interval, seconds
    pub max_run_time: u64,
    pub start_skills: StartSkills,
    pub dyn_ip_threshold: usize,
    pub dyn_ip_range: u32,
    pub mods: Vec<ModSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trueskill_mu: crate::DEFAULT_MU,
            trueskill_sigma: crate::DEFAULT_SIGMA,
            trueskill_beta: crate::DEFAULT_BETA,
            trueskill_tau: crate::DEFAULT_TAU,
            trueskill_draw_prob: crate::DEFAULT_DRAW_PROBABILITY,
            inactivity_penalty: PenaltyPolicy::default(),
            rerate_delay: crate::RERATE_DELAY_SECS,
            max_run_time: crate::MAX_RUN_TIME_SECS,
            start_skills: StartSkills::default(),
            dyn_ip_threshold: crate::DYN_IP_THRESHOLD,
            dyn_ip_range: crate::DYN_IP_RANGE,
            mods: vec![
                ModSpec {
                    short_name: "ba".to_string(),
                    regex: "^Balanced Annihilation".to_string(),
                },
                ModSpec {
                    short_name: "zk".to_string(),
                    regex: "^Zero-K".to_string(),
                },
                ModSpec {
                    short_name: "evo".to_string(),
                    regex: "^Evolution RTS".to_string(),
                },
                ModSpec {
                    short_name: "s44".to_string(),
                    regex: "^Spring: 1944".to_string(),
                },
            ],
        }
    }
}

impl Config {
    /// read the config file, falling back to defaults when absent
    pub fn load(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("no config at {}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn trueskill(&self) -> TrueSkill {
        TrueSkill {
            mu: self.trueskill_mu,
            sigma: self.trueskill_sigma,
            beta: self.trueskill_beta,
            tau: self.trueskill_tau,
            draw_probability: self.trueskill_draw_prob,
        }
    }

    /// compile the mod patterns once; first match wins
    pub fn mod_table(&self) -> anyhow::Result<ModTable> {
        let mut mods = Vec::with_capacity(self.mods.len());
        for spec in &self.mods {
            mods.push((spec.short_name.clone(), regex::Regex::new(&spec.regex)?));
        }
        Ok(ModTable(mods))
    }
}

/// compiled mod resolution table
#[derive(Debug, Clone)]
pub struct ModTable(Vec<(String, regex::Regex)>);

impl ModTable {
    pub fn resolve(&self, mod_name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, pattern)| pattern.is_match(mod_name))
            .map(|(short, _)| short.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_mods_resolve_by_pattern() {
        let table = Config::default().mod_table().expect("stock patterns compile");
        assert!(table.resolve("Balanced Annihilation V9.46") == Some("ba"));
        assert!(table.resolve("Zero-K v1.2.3") == Some("zk"));
        assert!(table.resolve("Some Unknown Mod").is_none());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).expect("serialise");
        let back: Config = serde_json::from_str(&json).expect("deserialise");
        assert!(back == cfg);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"rerateDelay": 60}"#).expect("partial");
        assert!(cfg.rerate_delay == 60);
        assert!(cfg.trueskill_mu == crate::DEFAULT_MU);
        assert!(!cfg.mods.is_empty());
    }
}
