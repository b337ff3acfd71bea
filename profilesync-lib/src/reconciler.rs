//! Per-update orchestration of the sync strategies.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{FaultKind, SyncError, Target, ValidationFault};
use crate::gateway::PersistenceGateway;
use crate::model::{Collection, OwnerId};
use crate::strategy::{Committed, StrategyOutcome, SyncStrategy};
use crate::transform::{check_fields_patch, items_to_rows};
use crate::update::ProfileUpdate;

/// Result of syncing one touched collection
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionResult {
    Committed(Committed),
    /// Storage for the collection does not exist
    Skipped,
    /// A value was rejected; nothing was written for this collection
    Rejected(ValidationFault),
}

/// Result of writing the scalar profile fields
#[derive(Debug, Clone, PartialEq)]
pub enum FieldsResult {
    Committed,
    Skipped,
    Rejected(ValidationFault),
}

/// How an update call ended, when it did not end fatally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    PartialFailure,
}

/// Per-target results of one reconcile call, in sync order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub collections: Vec<(Collection, CollectionResult)>,
    pub fields: Option<FieldsResult>,
}

impl SyncReport {
    pub fn outcome(&self) -> UpdateOutcome {
        if self.skipped().is_empty() && self.rejections().is_empty() {
            UpdateOutcome::Success
        } else {
            UpdateOutcome::PartialFailure
        }
    }

    pub fn result(&self, collection: Collection) -> Option<&CollectionResult> {
        self.collections
            .iter()
            .find(|(c, _)| *c == collection)
            .map(|(_, result)| result)
    }

    /// Targets whose storage was missing
    pub fn skipped(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self
            .collections
            .iter()
            .filter(|(_, result)| matches!(result, CollectionResult::Skipped))
            .map(|(c, _)| Target::Collection(*c))
            .collect();
        if matches!(self.fields, Some(FieldsResult::Skipped)) {
            targets.push(Target::Profile);
        }
        targets
    }

    pub fn rejections(&self) -> Vec<&ValidationFault> {
        let mut faults: Vec<&ValidationFault> = self
            .collections
            .iter()
            .filter_map(|(_, result)| match result {
                CollectionResult::Rejected(fault) => Some(fault),
                _ => None,
            })
            .collect();
        if let Some(FieldsResult::Rejected(fault)) = &self.fields {
            faults.push(fault);
        }
        faults
    }

    /// Turn the first rejected value into an error for the caller
    pub fn into_result(self) -> Result<Self, SyncError> {
        let first = self.rejections().first().map(|fault| (*fault).clone());
        match first {
            Some(fault) => Err(SyncError::Validation(fault)),
            None => Ok(self),
        }
    }
}

/// Dispatches each touched collection of an update to its strategy.
pub struct Reconciler<G: ?Sized> {
    gateway: Arc<G>,
}

impl<G: PersistenceGateway + ?Sized> Reconciler<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Write every touched part of `update` for `owner`.
    ///
    /// Order is wallet methods, social links, goals, then scalar fields.
    /// Missing storage and rejected values are confined to their target and
    /// recorded in the report; any other fault stops the call and is
    /// returned. Writes that already happened are not undone.
    #[tracing::instrument(skip_all, fields(owner = %owner))]
    pub async fn reconcile(&self, owner: OwnerId, update: &ProfileUpdate) -> Result<SyncReport, SyncError> {
        let now = Utc::now();
        let mut report = SyncReport::default();

        for collection in update.touched_collections() {
            let Some(items) = update.items(collection) else {
                continue;
            };

            let result = match items_to_rows(owner, &items) {
                Err(fault) => {
                    tracing::warn!(%collection, %fault, "rejected collection write");
                    CollectionResult::Rejected(fault)
                }
                Ok(rows) => {
                    let strategy = SyncStrategy::for_collection(collection);
                    match strategy.run(self.gateway.as_ref(), owner, rows, now).await {
                        Ok(StrategyOutcome::Committed(committed)) => CollectionResult::Committed(committed),
                        Ok(StrategyOutcome::Skipped) => CollectionResult::Skipped,
                        Err(SyncError::Validation(fault)) => {
                            tracing::warn!(%collection, %fault, "storage rejected collection write");
                            CollectionResult::Rejected(fault)
                        }
                        Err(e) => {
                            tracing::error!(%collection, error = %e, "collection sync failed");
                            return Err(e);
                        }
                    }
                }
            };
            report.collections.push((collection, result));
        }

        if let Some(patch) = update.fields.as_ref().filter(|_| update.touches_fields()) {
            let result = match check_fields_patch(patch) {
                Err(fault) => FieldsResult::Rejected(fault),
                Ok(()) => match self.gateway.update_scalar_fields(owner, patch).await {
                    Ok(()) => FieldsResult::Committed,
                    Err(e) => match e.kind() {
                        FaultKind::MissingCollection => {
                            tracing::warn!("profile storage missing, skipping field write");
                            FieldsResult::Skipped
                        }
                        FaultKind::Validation => match e {
                            SyncError::Validation(fault) => FieldsResult::Rejected(fault),
                            other => return Err(other),
                        },
                        FaultKind::TransientIo | FaultKind::Unexpected => {
                            tracing::error!(error = %e, "profile field update failed");
                            return Err(e);
                        }
                    },
                },
            };
            report.fields = Some(result);
        }

        tracing::info!(outcome = ?report.outcome(), "update reconciled");
        Ok(report)
    }
}
