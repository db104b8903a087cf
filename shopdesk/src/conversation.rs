use crate::client::SessionClient;
use crate::error::Result;
use crate::identifiers::Identity;
use crate::supplier::ExtraCharge;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

/// Login in progress: the login has been asked for, and maybe already typed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingAuth {
    pub entered_login: Option<String>,
}

/// What a multi-step exchange with one identity is currently waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    Auth(PendingAuth),
    ExtraCharge { supplier_slug: String },
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginStep {
    NotStarted,
    AwaitingPassword,
    Authorized,
    /// Backend refused the login/password; the exchange is over and must be restarted.
    Rejected,
}

#[derive(Debug, PartialEq)]
pub enum ChargeStep {
    NotStarted,
    /// Input did not parse; still waiting for a value.
    InvalidValue(String),
    Updated {
        supplier_slug: String,
        extra_charge: ExtraCharge,
        response: Value,
    },
}

/// In-memory `Identity -> PendingState` map.
///
/// At most one exchange per identity: starting a new one supersedes whatever was pending.
/// State is removed when the exchange completes or is cancelled. The lock is never held
/// across a network call.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    states: Arc<Mutex<HashMap<Identity, PendingState>>>,
}

impl ConversationStore {
    fn states(&self) -> std::sync::MutexGuard<'_, HashMap<Identity, PendingState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the superseded state, if any
    pub fn begin(&self, identity: Identity, state: PendingState) -> Option<PendingState> {
        let prev = self.states().insert(identity, state);
        if prev.is_some() {
            debug!("discarded pending state for identity {}", identity);
        }
        prev
    }

    pub fn get(&self, identity: Identity) -> Option<PendingState> {
        self.states().get(&identity).cloned()
    }

    /// Returns true if something was pending
    pub fn cancel(&self, identity: Identity) -> bool {
        self.states().remove(&identity).is_some()
    }

    pub fn start_login(&self, identity: Identity) {
        self.begin(identity, PendingState::Auth(PendingAuth::default()));
    }

    pub fn submit_login(&self, identity: Identity, login: &str) -> LoginStep {
        match self.states().get_mut(&identity) {
            Some(PendingState::Auth(pending)) => {
                pending.entered_login = Some(login.trim().to_string());
                LoginStep::AwaitingPassword
            }
            _ => LoginStep::NotStarted,
        }
    }

    /// Completes the login exchange. The pending state is gone afterwards whatever the outcome.
    pub async fn submit_password(
        &self,
        identity: Identity,
        password: &str,
        client: &SessionClient,
    ) -> Result<LoginStep> {
        let login = {
            let mut states = self.states();
            match states.remove(&identity) {
                Some(PendingState::Auth(PendingAuth {
                    entered_login: Some(login),
                })) => login,
                Some(other) => {
                    states.insert(identity, other);
                    return Ok(LoginStep::NotStarted);
                }
                None => return Ok(LoginStep::NotStarted),
            }
        };
        if client.login(identity, &login, password).await? {
            Ok(LoginStep::Authorized)
        } else {
            Ok(LoginStep::Rejected)
        }
    }

    pub fn start_charge_edit(&self, identity: Identity, supplier_slug: &str) {
        self.begin(
            identity,
            PendingState::ExtraCharge {
                supplier_slug: supplier_slug.to_string(),
            },
        );
    }

    /// Validates `input` and pushes it to the backend. Invalid input leaves the exchange open
    /// so the value can be entered again.
    pub async fn submit_extra_charge(
        &self,
        identity: Identity,
        input: &str,
        client: &SessionClient,
    ) -> Result<ChargeStep> {
        let (supplier_slug, extra_charge) = {
            let mut states = self.states();
            if !matches!(states.get(&identity), Some(PendingState::ExtraCharge { .. })) {
                return Ok(ChargeStep::NotStarted);
            }
            let extra_charge = match ExtraCharge::from_str(input) {
                Ok(v) => v,
                Err(e) => return Ok(ChargeStep::InvalidValue(e.to_string())),
            };
            match states.remove(&identity) {
                Some(PendingState::ExtraCharge { supplier_slug }) => (supplier_slug, extra_charge),
                _ => return Ok(ChargeStep::NotStarted),
            }
        };
        let response = client
            .update_supplier_charge(identity, &supplier_slug, extra_charge)
            .await?;
        Ok(ChargeStep::Updated {
            supplier_slug,
            extra_charge,
            response,
        })
    }
}
