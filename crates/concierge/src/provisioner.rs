//! Per-request capability provisioning.
//!
//! Acquiring extended capabilities can fail in several places: the identity
//! provider may have no usable credential, the call to it may fail outright,
//! or the credential may turn out to be unusable once the capabilities are
//! built from it. All of these paths are one state machine:
//!
//! ```text
//! Provisioning --NotRequired--------------------------> Invoking(base)
//! Provisioning --Usable(token)--> Extending(token) --Extended--> Invoking(base + extended)
//! Provisioning --Unusable(err)--> Degraded(note) -----------> Invoking(base, note)
//!                                 Extending --ExtensionFailed--> Degraded(note)
//! ```
//!
//! Nothing here fails: every failure becomes a [`DegradationNote`] and the base
//! capabilities are always offered.
use std::fmt;

use crate::capabilities::{CapabilitySet, ExtensionError, GOOGLE_CAPABILITY_NAMES};
use crate::identity::{AccessToken, CredentialError, IdentityProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// The user did not grant every requested permission
    InsufficientScope,
    /// The credential is absent, invalid or expired
    InvalidToken,
    /// The identity provider or the capability setup failed for another reason
    ServiceFailure,
}

impl Remediation {
    pub fn for_credential(error: &CredentialError) -> Self {
        match error {
            CredentialError::InsufficientScope(_) => Remediation::InsufficientScope,
            CredentialError::Absent | CredentialError::Expired => Remediation::InvalidToken,
            CredentialError::Unavailable(_) => Remediation::ServiceFailure,
        }
    }

    pub fn for_extension(error: &ExtensionError) -> Self {
        match error {
            ExtensionError::MissingScopes(_) => Remediation::InsufficientScope,
            ExtensionError::InvalidToken(_) => Remediation::InvalidToken,
            ExtensionError::Client(_) => Remediation::ServiceFailure,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Remediation::InsufficientScope => "the required Google permissions were not granted",
            Remediation::InvalidToken => "the Google sign-in is missing, invalid or has expired",
            Remediation::ServiceFailure => "the Google connection could not be established right now",
        }
    }

    /// What the user should do about it
    pub fn hint(&self) -> &'static str {
        match self {
            Remediation::InsufficientScope => {
                "Sign out and sign back in, and grant all requested permissions when prompted."
            }
            Remediation::InvalidToken => {
                "Sign out and sign back in to reconnect your Google account, granting all requested permissions."
            }
            Remediation::ServiceFailure => {
                "Try again in a moment. If the problem persists, sign out and sign back in, granting all requested permissions."
            }
        }
    }
}

/// Explanation of reduced functionality, appended to the behavior template
#[derive(Debug, Clone, PartialEq)]
pub struct DegradationNote {
    pub unavailable: Vec<String>,
    pub remediation: Remediation,
    /// Underlying failure, for logs only
    pub detail: String,
}

impl DegradationNote {
    pub fn new<S: Into<String>>(remediation: Remediation, detail: S) -> Self {
        Self {
            unavailable: GOOGLE_CAPABILITY_NAMES.iter().map(|s| s.to_string()).collect(),
            remediation,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for DegradationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "IMPORTANT: The following tools are currently unavailable: {}.",
            self.unavailable.join(", ")
        )?;
        writeln!(f, "Reason: {}.", self.remediation.reason())?;
        write!(
            f,
            "If the user asks for anything that needs these tools, explain that the feature is \
             unavailable and how to fix it: {}",
            self.remediation.hint()
        )
    }
}

/// The capabilities offered for one request, plus the note explaining any
/// that were withheld
#[derive(Clone)]
pub struct Provision {
    pub capabilities: CapabilitySet,
    pub note: Option<DegradationNote>,
}

impl fmt::Debug for Provision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .capabilities
            .iter()
            .map(|c| c.tool().name.as_str())
            .collect();
        f.debug_struct("Provision")
            .field("capabilities", &names)
            .field("note", &self.note)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialOutcome {
    /// No capability in this variant needs a delegated credential
    NotRequired,
    Usable(AccessToken),
    Unusable(CredentialError),
}

impl From<Result<AccessToken, CredentialError>> for CredentialOutcome {
    fn from(result: Result<AccessToken, CredentialError>) -> Self {
        match result {
            Ok(token) => CredentialOutcome::Usable(token),
            Err(err) => CredentialOutcome::Unusable(err),
        }
    }
}

#[derive(Debug)]
pub enum Stage {
    Provisioning,
    Extending(AccessToken),
    Degraded(DegradationNote),
    Invoking(Provision),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Provisioning => "provisioning",
            Stage::Extending(_) => "extending",
            Stage::Degraded(_) => "degraded",
            Stage::Invoking(_) => "invoking",
        }
    }
}

pub enum Event {
    Credential(CredentialOutcome),
    Extended(CapabilitySet),
    ExtensionFailed(ExtensionError),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Credential(_) => "credential",
            Event::Extended(_) => "extended",
            Event::ExtensionFailed(_) => "extension_failed",
        }
    }
}

pub struct Provisioner {
    base: CapabilitySet,
}

impl Provisioner {
    pub fn new(base: CapabilitySet) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &CapabilitySet {
        &self.base
    }

    /// The single transition table of the cascade
    pub fn transition(&self, stage: Stage, event: Event) -> Stage {
        let from = stage.name();
        let next = match (stage, event) {
            (Stage::Provisioning, Event::Credential(CredentialOutcome::NotRequired)) => {
                Stage::Invoking(Provision {
                    capabilities: self.base.clone(),
                    note: None,
                })
            }
            (Stage::Provisioning, Event::Credential(CredentialOutcome::Usable(token))) => {
                if token.is_expired() {
                    Stage::Degraded(DegradationNote::new(
                        Remediation::InvalidToken,
                        "credential expired before use",
                    ))
                } else {
                    Stage::Extending(token)
                }
            }
            (Stage::Provisioning, Event::Credential(CredentialOutcome::Unusable(err))) => {
                Stage::Degraded(DegradationNote::new(
                    Remediation::for_credential(&err),
                    err.to_string(),
                ))
            }
            (Stage::Extending(_), Event::Extended(extended)) => {
                let mut capabilities = self.base.clone();
                capabilities.extend(extended);
                Stage::Invoking(Provision {
                    capabilities,
                    note: None,
                })
            }
            (Stage::Extending(_), Event::ExtensionFailed(err)) => Stage::Degraded(
                DegradationNote::new(Remediation::for_extension(&err), err.to_string()),
            ),
            (stage, event) => {
                tracing::error!(
                    stage = stage.name(),
                    event = event.name(),
                    "unexpected provisioning event"
                );
                Stage::Degraded(DegradationNote::new(
                    Remediation::ServiceFailure,
                    format!("unexpected {} event while {}", event.name(), stage.name()),
                ))
            }
        };
        tracing::debug!(from, to = next.name(), "provisioning transition");

        match next {
            Stage::Degraded(note) => {
                tracing::warn!(
                    detail = %note.detail,
                    remediation = ?note.remediation,
                    "extended capabilities unavailable, continuing with base capabilities"
                );
                Stage::Invoking(Provision {
                    capabilities: self.base.clone(),
                    note: Some(note),
                })
            }
            other => other,
        }
    }

    /// Run the cascade for a known credential outcome.
    ///
    /// `extend` builds the credential-requiring capabilities from a usable token.
    pub fn provision<F>(&self, outcome: CredentialOutcome, extend: F) -> Provision
    where
        F: FnOnce(&AccessToken) -> Result<CapabilitySet, ExtensionError>,
    {
        let mut extend = Some(extend);
        let mut stage = self.transition(Stage::Provisioning, Event::Credential(outcome));
        loop {
            stage = match stage {
                Stage::Invoking(provision) => return provision,
                Stage::Extending(token) => {
                    let event = match extend.take() {
                        Some(build) => match build(&token) {
                            Ok(extended) => Event::Extended(extended),
                            Err(err) => Event::ExtensionFailed(err),
                        },
                        None => Event::ExtensionFailed(ExtensionError::Client(
                            "extended capabilities were already built".to_string(),
                        )),
                    };
                    self.transition(Stage::Extending(token), event)
                }
                other => self.transition(
                    other,
                    Event::ExtensionFailed(ExtensionError::Client("stalled".to_string())),
                ),
            };
        }
    }

    /// Acquire a credential from the identity provider (if extended
    /// capabilities are configured at all) and run the cascade.
    pub async fn acquire<F>(
        &self,
        identity: Option<&dyn IdentityProvider>,
        session: Option<String>,
        extend: F,
    ) -> Provision
    where
        F: FnOnce(&AccessToken) -> Result<CapabilitySet, ExtensionError>,
    {
        let outcome = match identity {
            None => CredentialOutcome::NotRequired,
            Some(identity) => identity.access_token(session).await.into(),
        };
        self.provision(outcome, extend)
    }
}
