// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::Serialize;
use std::fmt;

use crate::account::AdminAccount;

/// Result of one bootstrap step.
///
/// A soft failure is logged and the run carries on; a hard failure ends the run in a
/// degraded state. Neither is ever raised to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome<T> {
    Success(T),
    SoftFailure(String),
    HardFailure(String),
}

impl<T> OperationOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Steps of a bootstrap run, in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    Start,
    ConnectivityChecked,
    SchemaChecked,
    AccountQueried,
    AccountCreated,
    AccountUpdated,
    Done,
}

/// Why a run ended without guaranteeing the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DegradedReason {
    /// Connectivity gate exhausted its attempts.
    NoConnection,
    /// The `users` table is absent.
    NoUsersTable,
    /// Both read strategies failed.
    ReadFailed(String),
    /// Both insert strategies failed for a reason other than a lost race.
    CreateFailed(String),
    /// A step failed unexpectedly or panicked.
    Internal(String),
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConnection => write!(f, "database unreachable"),
            Self::NoUsersTable => write!(f, "users table missing"),
            Self::ReadFailed(e) => write!(f, "account lookup failed: {}", e),
            Self::CreateFailed(e) => write!(f, "account creation failed: {}", e),
            Self::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// The account did not exist and was inserted.
    Created { account: AdminAccount },
    /// The account existed; `refreshed` tells whether the password reset stuck.
    Updated { account: AdminAccount, refreshed: bool },
    /// Another run inserted the account first.
    Existing { account: Option<AdminAccount> },
    Degraded { reason: DegradedReason },
}

impl BootstrapOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Existing { .. } => "existing",
            Self::Degraded { .. } => "degraded",
        }
    }

    /// The account as last seen, if the run got that far.
    #[must_use]
    pub fn account(&self) -> Option<&AdminAccount> {
        match self {
            Self::Created { account } | Self::Updated { account, .. } => Some(account),
            Self::Existing { account } => account.as_ref(),
            Self::Degraded { .. } => None,
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Everything a bootstrap run has to say about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub outcome: BootstrapOutcome,
    /// States visited, starting with `Start` and ending with `Done`.
    pub trail: Vec<BootstrapState>,
    pub soft_failures: Vec<String>,
}

impl BootstrapReport {
    #[must_use]
    pub fn account(&self) -> Option<&AdminAccount> {
        self.outcome.account()
    }

    #[must_use]
    pub fn visited(&self, state: BootstrapState) -> bool {
        self.trail.contains(&state)
    }
}
