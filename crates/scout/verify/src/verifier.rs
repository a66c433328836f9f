//! Bounded verification protocol
//!
//! Per contract: `Pending -> Submitted -> {Verified | Failed | Unknown}`.
//! A submission is polled at a fixed interval for at most
//! `max_poll_attempts` polls; running out of attempts, or shutdown, leaves
//! the contract `Unknown`. Connectivity failures never abort the run: a
//! contract that could not be submitted simply stays `Pending`.

use crate::catalog::RequiredContracts;
use crate::traits::{ExplorerHandle, VerificationClient};
use futures::future::join_all;
use scout_types::{normalize_address, ContractMeta, PollStatus, VerificationToken};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Polling knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Delay before each status poll
    pub poll_interval: Duration,

    /// Polls per submission before giving up
    pub max_poll_attempts: u32,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 30,
        }
    }
}

/// Final state of one contract within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractState {
    /// Not submitted
    Pending,
    /// Submitted, never polled to a result
    Submitted(VerificationToken),
    Verified,
    Failed(String),
    /// Poll budget exhausted or run cancelled
    Unknown,
}

/// Outcome of one verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Per-address state, keyed by normalized address
    pub contracts: BTreeMap<String, ContractState>,

    /// Required contracts
    pub required: usize,

    /// Required contracts the explorer reported as verified on re-query
    pub verified: usize,

    /// Addresses a verification request was accepted for in this run
    pub submitted: Vec<String>,
}

impl VerificationReport {
    /// Every required contract is reported verified
    pub fn is_complete(&self) -> bool {
        self.verified == self.required
    }
}

/// Drives verification of a unit's required contracts
#[derive(Clone)]
pub struct Verifier {
    client: Arc<dyn VerificationClient>,
    policy: VerificationPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Verifier {
    pub fn new(
        client: Arc<dyn VerificationClient>,
        policy: VerificationPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    /// Verified addresses reported by the explorer. Errors count as none.
    async fn reported(&self, target: &ExplorerHandle) -> HashSet<String> {
        match self.client.list_verified_addresses(target).await {
            Ok(addresses) => addresses,
            Err(e) => {
                tracing::warn!(unit = %target.name, error = %e, "Listing verified contracts failed");
                HashSet::new()
            }
        }
    }

    /// Submit and poll every required contract not yet verified, then
    /// re-query the explorer for the final coverage.
    pub async fn verify(
        &self,
        target: &ExplorerHandle,
        required: &RequiredContracts,
    ) -> VerificationReport {
        let reported = self.reported(target).await;

        let mut contracts = BTreeMap::new();
        let mut pending = Vec::new();
        for (address, meta) in required {
            let key = normalize_address(address);
            if reported.contains(&key) {
                contracts.insert(key, ContractState::Verified);
            } else {
                pending.push((key, address.as_str(), meta));
            }
        }

        tracing::info!(
            unit = %target.name,
            required = required.len(),
            pending = pending.len(),
            "Verifying contracts"
        );

        let nothing_pending = pending.is_empty();
        let outcomes = join_all(
            pending
                .into_iter()
                .map(|(key, address, meta)| async move {
                    (key, self.verify_one(target, address, meta).await)
                }),
        )
        .await;
        let submitted = outcomes
            .iter()
            .filter(|(_, state)| *state != ContractState::Pending)
            .map(|(key, _)| key.clone())
            .collect();
        contracts.extend(outcomes);

        let required_keys: HashSet<String> = required.keys().map(|a| normalize_address(a)).collect();
        let verified = if nothing_pending {
            // Nothing to submit, so the first listing is current.
            required_keys.intersection(&reported).count()
        } else {
            let reported = self.reported(target).await;
            required_keys.intersection(&reported).count()
        };

        VerificationReport {
            contracts,
            required: required_keys.len(),
            verified,
            submitted,
        }
    }

    async fn verify_one(
        &self,
        target: &ExplorerHandle,
        address: &str,
        meta: &ContractMeta,
    ) -> ContractState {
        let token = match self.client.submit(target, address, meta).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(unit = %target.name, %address, error = %e, "Verification submit failed");
                return ContractState::Pending;
            }
        };
        tracing::info!(unit = %target.name, %address, %token, "Verification submitted");

        let mut shutdown = self.shutdown.clone();
        for attempt in 1..=self.policy.max_poll_attempts {
            if !self.pause(&mut shutdown).await {
                tracing::debug!(unit = %target.name, %address, "Verification polling cancelled");
                return ContractState::Unknown;
            }
            match self.client.poll_status(target, &token).await {
                Ok(PollStatus::Pass) => return ContractState::Verified,
                Ok(PollStatus::Fail(reason)) => {
                    tracing::warn!(unit = %target.name, %address, %reason, "Verification failed");
                    return ContractState::Failed(reason);
                }
                Ok(status) => {
                    tracing::debug!(unit = %target.name, %address, attempt, ?status, "Verification not finished");
                }
                Err(e) => {
                    tracing::debug!(unit = %target.name, %address, attempt, error = %e, "Verification poll failed");
                }
            }
        }

        if self.policy.max_poll_attempts == 0 {
            return ContractState::Submitted(token);
        }
        tracing::warn!(
            unit = %target.name,
            %address,
            attempts = self.policy.max_poll_attempts,
            "Verification poll budget exhausted"
        );
        ContractState::Unknown
    }

    /// Sleep one poll interval. Returns false when shutdown was requested.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.policy.poll_interval) => true,
            changed = shutdown.changed() => match changed {
                Ok(()) => !*shutdown.borrow(),
                Err(_) => {
                    tokio::time::sleep(self.policy.poll_interval).await;
                    true
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryVerificationClient, PollBehavior};
    use scout_types::UnitName;

    const A: &str = "0xD2aaa00100000000000000000000000000000000";
    const B: &str = "0xD2aaa00200000000000000000000000000000000";

    fn meta(name: &str) -> ContractMeta {
        ContractMeta {
            name: name.into(),
            solc_long_version: "0.8.11+commit.d7f03943".into(),
            input: serde_json::json!({}),
        }
    }

    fn required() -> RequiredContracts {
        [(A.to_string(), meta("A")), (B.to_string(), meta("B"))]
            .into_iter()
            .collect()
    }

    fn target() -> ExplorerHandle {
        ExplorerHandle::new(UnitName::new("alpha"), "http://127.0.0.1:4000")
    }

    fn verifier(client: Arc<MemoryVerificationClient>, attempts: u32) -> (Verifier, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let policy = VerificationPolicy {
            poll_interval: Duration::from_millis(10),
            max_poll_attempts: attempts,
        };
        (Verifier::new(client, policy, rx), tx)
    }

    #[tokio::test]
    async fn test_full_coverage() {
        let client = Arc::new(MemoryVerificationClient::new(PollBehavior::PassAfter(2)));
        client.mark_verified(&UnitName::new("alpha"), A);
        let (verifier, _tx) = verifier(client.clone(), 5);

        let report = verifier.verify(&target(), &required()).await;
        assert!(report.is_complete());
        assert_eq!(report.required, 2);
        assert_eq!(client.submissions(), vec![normalize_address(B)]);
        assert_eq!(report.submitted, vec![normalize_address(B)]);
    }

    #[tokio::test]
    async fn test_bounded_polling_yields_unknown() {
        let client = Arc::new(MemoryVerificationClient::new(PollBehavior::NeverFinish));
        let (verifier, _tx) = verifier(client.clone(), 3);

        let report = verifier.verify(&target(), &required()).await;
        assert!(!report.is_complete());
        assert_eq!(report.verified, 0);
        assert_eq!(report.contracts[&normalize_address(A)], ContractState::Unknown);
        assert_eq!(client.poll_count(), 6);
    }

    #[tokio::test]
    async fn test_failed_verification() {
        let client = Arc::new(MemoryVerificationClient::new(PollBehavior::Fail));
        let (verifier, _tx) = verifier(client, 3);

        let report = verifier.verify(&target(), &required()).await;
        assert!(matches!(
            report.contracts[&normalize_address(B)],
            ContractState::Failed(_)
        ));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_connectivity_failures_are_swallowed() {
        let client = Arc::new(MemoryVerificationClient::new(PollBehavior::PassAfter(1)));
        client.set_unreachable(true);
        let (verifier, _tx) = verifier(client, 3);

        let report = verifier.verify(&target(), &required()).await;
        assert_eq!(report.verified, 0);
        assert!(report.submitted.is_empty());
        assert!(report
            .contracts
            .values()
            .all(|s| *s == ContractState::Pending));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_polling() {
        let client = Arc::new(MemoryVerificationClient::new(PollBehavior::NeverFinish));
        let (verifier, tx) = verifier(client.clone(), u32::MAX);
        tx.send(true).unwrap();

        let report = verifier.verify(&target(), &required()).await;
        assert_eq!(report.contracts[&normalize_address(A)], ContractState::Unknown);
        assert_eq!(client.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_required_is_complete() {
        let client = Arc::new(MemoryVerificationClient::new(PollBehavior::Fail));
        let (verifier, _tx) = verifier(client, 1);
        let report = verifier.verify(&target(), &RequiredContracts::new()).await;
        assert!(report.is_complete());
    }
}
