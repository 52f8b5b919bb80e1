use crate::AccountId;
use crate::UserId;
use crate::store::PrefStore;
use crate::store::StoreError;
use tokio_postgres::Client;

/// which entity a preference hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefScope {
    Account,
    User,
}

/// a recognised preference: canonical name, scope, default, and the
/// pattern accepted values must match
#[derive(Debug, Clone, Copy)]
pub struct Preference {
    pub name: &'static str,
    pub scope: PrefScope,
    pub default: &'static str,
    pub pattern: &'static str,
}

pub const PREFERENCES: [Preference; 2] = [
    Preference {
        name: "ircColors",
        scope: PrefScope::Account,
        default: "1",
        pattern: "^[01]$",
    },
    Preference {
        name: "privacyMode",
        scope: PrefScope::User,
        default: "1",
        pattern: "^[012]$",
    },
];

#[derive(Debug, thiserror::Error)]
pub enum PrefError {
    #[error("unknown {1:?}-scoped preference {0:?}")]
    Unknown(String, &'static str),
    #[error("preference {name:?} does not accept {value:?}")]
    Invalid { name: String, value: String },
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// case-insensitive lookup of a recognised preference in one scope
pub fn recognised(name: &str, scope: PrefScope) -> Option<&'static Preference> {
    PREFERENCES
        .iter()
        .find(|p| p.scope == scope && p.name.eq_ignore_ascii_case(name))
}

fn accepts(pref: &Preference, value: &str) -> bool {
    regex::Regex::new(pref.pattern)
        .expect("preference patterns are static")
        .is_match(value)
}

fn resolve(name: &str, scope: PrefScope) -> Result<&'static Preference, PrefError> {
    let label = match scope {
        PrefScope::Account => "account",
        PrefScope::User => "user",
    };
    recognised(name, scope).ok_or_else(|| PrefError::Unknown(name.to_string(), label))
}

/// read an account preference, defaulting when unset
pub async fn account_pref(
    client: &Client,
    account: AccountId,
    name: &str,
) -> Result<String, PrefError> {
    let pref = resolve(name, PrefScope::Account)?;
    Ok(client
        .account_pref(account, pref.name)
        .await?
        .unwrap_or_else(|| pref.default.to_string()))
}

/// set an account preference, canonicalising the name's case
pub async fn set_account_pref(
    client: &Client,
    account: AccountId,
    name: &str,
    value: &str,
) -> Result<(), PrefError> {
    let pref = resolve(name, PrefScope::Account)?;
    if !accepts(pref, value) {
        return Err(PrefError::Invalid {
            name: pref.name.to_string(),
            value: value.to_string(),
        });
    }
    Ok(client.set_account_pref(account, pref.name, value).await?)
}

/// read a user preference, defaulting when unset
pub async fn user_pref(client: &Client, user: UserId, name: &str) -> Result<String, PrefError> {
    let pref = resolve(name, PrefScope::User)?;
    Ok(client
        .user_pref(user, pref.name)
        .await?
        .unwrap_or_else(|| pref.default.to_string()))
}

/// set a user preference, canonicalising the name's case
pub async fn set_user_pref(
    client: &Client,
    user: UserId,
    name: &str,
    value: &str,
) -> Result<(), PrefError> {
    let pref = resolve(name, PrefScope::User)?;
    if !accepts(pref, value) {
        return Err(PrefError::Invalid {
            name: pref.name.to_string(),
            value: value.to_string(),
        });
    }
    Ok(client.set_user_pref(user, pref.name, value).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_scoped() {
        assert!(recognised("IRCCOLORS", PrefScope::Account).is_some());
        assert!(recognised("irccolors", PrefScope::User).is_none());
        assert!(recognised("PrivacyMode", PrefScope::User).is_some());
        assert!(recognised("theme", PrefScope::Account).is_none());
    }

    #[test]
    fn validators_bound_the_value_sets() {
        let irc = recognised("ircColors", PrefScope::Account).expect("known");
        assert!(accepts(irc, "0") && accepts(irc, "1"));
        assert!(!accepts(irc, "2") && !accepts(irc, "10"));
        let privacy = recognised("privacyMode", PrefScope::User).expect("known");
        assert!(accepts(privacy, "2"));
        assert!(!accepts(privacy, "3") && !accepts(privacy, ""));
    }

    #[test]
    fn defaults_match_the_contract() {
        assert!(recognised("ircColors", PrefScope::Account).expect("known").default == "1");
        assert!(recognised("privacyMode", PrefScope::User).expect("known").default == "1");
    }
}
