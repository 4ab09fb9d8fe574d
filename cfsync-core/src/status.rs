//! Status projection.
//!
//! Outcomes are folded into a declared resource by pure functions. The
//! caller persists the returned value; nothing here touches the store.

use chrono::{DateTime, Utc};

use crate::condition::{Condition, Reason, set_condition};
use crate::engine::{Outcome, Step};
use crate::error::{ErrorKind, RemoteError};
use crate::identity::{clear_external_name, set_external_name};
use crate::resource::DeclaredResource;

/// Project an invocation outcome into the resource's status and binding.
pub fn apply_outcome(
    mut res: DeclaredResource,
    outcome: &Outcome,
    now: DateTime<Utc>,
) -> DeclaredResource {
    let conds = &mut res.status.conditions;

    match outcome {
        Outcome::Created {
            external_name,
            observation,
        } => {
            set_condition(conds, Condition::ready(now));
            set_condition(conds, Condition::synced(now));
            res.status.at_provider = Some(observation.clone());
            set_external_name(&mut res, external_name);
        }
        Outcome::UpToDate { observation } | Outcome::Updated { observation } => {
            set_condition(conds, Condition::ready(now));
            set_condition(conds, Condition::synced(now));
            res.status.at_provider = Some(observation.clone());
        }
        Outcome::Deleted | Outcome::NothingToDelete => {
            set_condition(conds, Condition::not_ready(Reason::Deleting, None, now));
            set_condition(conds, Condition::synced(now));
            res.status.at_provider = None;
            clear_external_name(&mut res);
        }
        Outcome::Failed { step, error } => project_failure(&mut res, *step, error, now),
    }

    stamp(&mut res, now);
    res
}

fn project_failure(res: &mut DeclaredResource, step: Step, error: &RemoteError, now: DateTime<Utc>) {
    let conds = &mut res.status.conditions;
    let msg = Some(error.to_string());
    let reason = match error.kind() {
        ErrorKind::Transient => Reason::TransientError,
        ErrorKind::NotFound | ErrorKind::Permanent => Reason::ReconcileError,
    };

    match step {
        Step::Decode | Step::Observe => {
            // A transient observe failure leaves Ready as it was.
            if reason == Reason::ReconcileError {
                set_condition(conds, Condition::not_ready(reason, msg.clone(), now));
            }
            set_condition(conds, Condition::not_synced(reason, msg, now));
        }
        Step::Create => {
            set_condition(conds, Condition::not_ready(reason, msg.clone(), now));
            set_condition(conds, Condition::not_synced(reason, msg, now));
        }
        Step::Update => {
            set_condition(conds, Condition::not_synced(reason, msg, now));
        }
        Step::Delete => {
            set_condition(conds, Condition::not_ready(Reason::Deleting, msg.clone(), now));
            set_condition(conds, Condition::not_synced(reason, msg, now));
        }
    }
}

/// Project a kind that has no usable adapter.
pub fn apply_unsupported(
    mut res: DeclaredResource,
    message: &str,
    now: DateTime<Utc>,
) -> DeclaredResource {
    let msg = Some(message.to_string());
    let conds = &mut res.status.conditions;
    set_condition(
        conds,
        Condition::not_ready(Reason::KindUnsupported, msg.clone(), now),
    );
    set_condition(
        conds,
        Condition::not_synced(Reason::KindUnsupported, msg, now),
    );
    stamp(&mut res, now);
    res
}

fn stamp(res: &mut DeclaredResource, now: DateTime<Utc>) {
    res.status.observed_generation = res.metadata.generation;
    res.status.last_reconcile_time = Some(now);
}
