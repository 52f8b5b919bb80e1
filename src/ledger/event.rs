use crate::AccountId;
use crate::UserId;

/// the audit event vocabulary. ids and required parameter lists are part
/// of the wire contract with the admin tooling and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    UpdUserDetails,
    JoinAcc,
    SplitAcc,
    AddProbSmurf,
    DelProbSmurf,
    AddNotSmurf,
    DelNotSmurf,
}

impl EventKind {
    pub fn id(&self) -> i16 {
        match self {
            EventKind::UpdUserDetails => 0,
            EventKind::JoinAcc => 1,
            EventKind::SplitAcc => 2,
            EventKind::AddProbSmurf => 3,
            EventKind::DelProbSmurf => 4,
            EventKind::AddNotSmurf => 5,
            EventKind::DelNotSmurf => 6,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    pub const ALL: [EventKind; 7] = [
        EventKind::UpdUserDetails,
        EventKind::JoinAcc,
        EventKind::SplitAcc,
        EventKind::AddProbSmurf,
        EventKind::DelProbSmurf,
        EventKind::AddNotSmurf,
        EventKind::DelNotSmurf,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::UpdUserDetails => "UPD_USERDETAILS",
            EventKind::JoinAcc => "JOIN_ACC",
            EventKind::SplitAcc => "SPLIT_ACC",
            EventKind::AddProbSmurf => "ADD_PROB_SMURF",
            EventKind::DelProbSmurf => "DEL_PROB_SMURF",
            EventKind::AddNotSmurf => "ADD_NOT_SMURF",
            EventKind::DelNotSmurf => "DEL_NOT_SMURF",
        }
    }

    /// the fixed parameter list, in template order
    pub fn params(&self) -> &'static [&'static str] {
        match self {
            EventKind::UpdUserDetails => {
                &["updatedUserId", "updatedParam", "oldValue", "newValue"]
            }
            EventKind::JoinAcc => &["mainUserId", "childUserId"],
            EventKind::SplitAcc => &["oldUserId", "newUserId", "accountId"],
            EventKind::AddProbSmurf
            | EventKind::DelProbSmurf
            | EventKind::AddNotSmurf
            | EventKind::DelNotSmurf => &["accountId1", "accountId2"],
        }
    }

    /// default message template, %param% placeholders
    pub fn template(&self) -> &'static str {
        match self {
            EventKind::UpdUserDetails => {
                "user %updatedUserId%: %updatedParam% changed from %oldValue% to %newValue%"
            }
            EventKind::JoinAcc => "user %childUserId% merged into user %mainUserId%",
            EventKind::SplitAcc => {
                "account %accountId% split from user %oldUserId% into user %newUserId%"
            }
            EventKind::AddProbSmurf => {
                "accounts %accountId1% and %accountId2% marked probable smurfs"
            }
            EventKind::DelProbSmurf => {
                "accounts %accountId1% and %accountId2% no longer probable smurfs"
            }
            EventKind::AddNotSmurf => {
                "accounts %accountId1% and %accountId2% marked not smurfs"
            }
            EventKind::DelNotSmurf => {
                "accounts %accountId1% and %accountId2% no longer marked not smurfs"
            }
        }
    }
}

/// who caused the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Auto,
    Admin,
    User,
}

impl EventOrigin {
    pub fn id(&self) -> i16 {
        match self {
            EventOrigin::Auto => 0,
            EventOrigin::Admin => 1,
            EventOrigin::User => 2,
        }
    }
}

/// a typed event payload. each variant carries exactly the parameters
/// its kind requires, so a malformed event cannot be constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    UpdUserDetails {
        updated_user_id: UserId,
        updated_param: String,
        old_value: String,
        new_value: String,
    },
    JoinAcc {
        main_user_id: UserId,
        child_user_id: UserId,
    },
    SplitAcc {
        old_user_id: UserId,
        new_user_id: UserId,
        account_id: AccountId,
    },
    AddProbSmurf {
        account_id1: AccountId,
        account_id2: AccountId,
    },
    DelProbSmurf {
        account_id1: AccountId,
        account_id2: AccountId,
    },
    AddNotSmurf {
        account_id1: AccountId,
        account_id2: AccountId,
    },
    DelNotSmurf {
        account_id1: AccountId,
        account_id2: AccountId,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::UpdUserDetails { .. } => EventKind::UpdUserDetails,
            EventPayload::JoinAcc { .. } => EventKind::JoinAcc,
            EventPayload::SplitAcc { .. } => EventKind::SplitAcc,
            EventPayload::AddProbSmurf { .. } => EventKind::AddProbSmurf,
            EventPayload::DelProbSmurf { .. } => EventKind::DelProbSmurf,
            EventPayload::AddNotSmurf { .. } => EventKind::AddNotSmurf,
            EventPayload::DelNotSmurf { .. } => EventKind::DelNotSmurf,
        }
    }

    /// parameter rows in the kind's canonical order
    pub fn params(&self) -> Vec<(String, String)> {
        let values: Vec<String> = match self {
            EventPayload::UpdUserDetails {
                updated_user_id,
                updated_param,
                old_value,
                new_value,
            } => vec![
                updated_user_id.to_string(),
                updated_param.clone(),
                old_value.clone(),
                new_value.clone(),
            ],
            EventPayload::JoinAcc {
                main_user_id,
                child_user_id,
            } => vec![main_user_id.to_string(), child_user_id.to_string()],
            EventPayload::SplitAcc {
                old_user_id,
                new_user_id,
                account_id,
            } => vec![
                old_user_id.to_string(),
                new_user_id.to_string(),
                account_id.to_string(),
            ],
            EventPayload::AddProbSmurf {
                account_id1,
                account_id2,
            }
            | EventPayload::DelProbSmurf {
                account_id1,
                account_id2,
            }
            | EventPayload::AddNotSmurf {
                account_id1,
                account_id2,
            }
            | EventPayload::DelNotSmurf {
                account_id1,
                account_id2,
            } => vec![account_id1.to_string(), account_id2.to_string()],
        };
        self.kind()
            .params()
            .iter()
            .map(|&name| name.to_string())
            .zip(values)
            .collect()
    }

    /// the default message, rendered from the kind's template
    pub fn render(&self) -> String {
        let mut message = self.kind().template().to_string();
        for (name, value) in self.params() {
            message = message.replace(&format!("%{}%", name), &value);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_the_wire_contract() {
        assert!(EventKind::UpdUserDetails.id() == 0);
        assert!(EventKind::JoinAcc.id() == 1);
        assert!(EventKind::SplitAcc.id() == 2);
        assert!(EventKind::DelNotSmurf.id() == 6);
        for kind in EventKind::ALL {
            assert!(EventKind::from_id(kind.id()) == Some(kind));
        }
    }

    #[test]
    fn payloads_carry_exactly_the_required_params() {
        for kind in EventKind::ALL {
            let payload = sample(kind);
            let params = payload.params();
            assert!(params.len() == kind.params().len());
            for ((name, _), &required) in params.iter().zip(kind.params()) {
                assert!(name == required);
            }
        }
    }

    #[test]
    fn templates_render_every_placeholder() {
        for kind in EventKind::ALL {
            let rendered = sample(kind).render();
            assert!(!rendered.contains('%'), "{}", rendered);
        }
    }

    #[test]
    fn join_message_names_both_users() {
        let rendered = EventPayload::JoinAcc {
            main_user_id: 10,
            child_user_id: 20,
        }
        .render();
        assert!(rendered == "user 20 merged into user 10");
    }

    fn sample(kind: EventKind) -> EventPayload {
        match kind {
            EventKind::UpdUserDetails => EventPayload::UpdUserDetails {
                updated_user_id: 1,
                updated_param: "name".into(),
                old_value: "old".into(),
                new_value: "new".into(),
            },
            EventKind::JoinAcc => EventPayload::JoinAcc {
                main_user_id: 1,
                child_user_id: 2,
            },
            EventKind::SplitAcc => EventPayload::SplitAcc {
                old_user_id: 1,
                new_user_id: 2,
                account_id: 3,
            },
            EventKind::AddProbSmurf => EventPayload::AddProbSmurf {
                account_id1: 1,
                account_id2: 2,
            },
            EventKind::DelProbSmurf => EventPayload::DelProbSmurf {
                account_id1: 1,
                account_id2: 2,
            },
            EventKind::AddNotSmurf => EventPayload::AddNotSmurf {
                account_id1: 1,
                account_id2: 2,
            },
            EventKind::DelNotSmurf => EventPayload::DelNotSmurf {
                account_id1: 1,
                account_id2: 2,
            },
        }
    }
}
