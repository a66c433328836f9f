//! In-memory verification client for development and testing

use crate::error::{Result, VerifyError};
use crate::traits::{ExplorerHandle, VerificationClient};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use scout_types::{normalize_address, ContractMeta, PollStatus, UnitName, VerificationToken};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How queued verifications progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBehavior {
    /// Pass on the n-th poll of a token
    PassAfter(u32),
    /// Fail on the first poll
    Fail,
    /// Stay pending forever
    NeverFinish,
}

#[derive(Debug, Clone)]
struct Queued {
    unit: UnitName,
    address: String,
    polls: u32,
}

/// Explorer stand-in tracking verified addresses per unit
#[derive(Debug)]
pub struct MemoryVerificationClient {
    behavior: PollBehavior,
    verified: DashMap<UnitName, HashSet<String>>,
    queue: DashMap<String, Queued>,
    submissions: DashSet<String>,
    next_token: AtomicUsize,
    polls: AtomicUsize,
    unreachable: AtomicBool,
}

impl MemoryVerificationClient {
    pub fn new(behavior: PollBehavior) -> Self {
        Self {
            behavior,
            verified: DashMap::new(),
            queue: DashMap::new(),
            submissions: DashSet::new(),
            next_token: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Record `address` as already verified on `unit`'s explorer
    pub fn mark_verified(&self, unit: &UnitName, address: &str) {
        self.verified
            .entry(unit.clone())
            .or_default()
            .insert(normalize_address(address));
    }

    /// Make every call fail as if the explorer were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Normalized addresses submitted so far, sorted
    pub fn submissions(&self) -> Vec<String> {
        let mut submitted: Vec<String> = self.submissions.iter().map(|a| a.key().clone()).collect();
        submitted.sort();
        submitted
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn check(&self, target: &ExplorerHandle) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(VerifyError::Unreachable(target.base_url.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl VerificationClient for MemoryVerificationClient {
    async fn list_verified_addresses(&self, target: &ExplorerHandle) -> Result<HashSet<String>> {
        self.check(target)?;
        Ok(self
            .verified
            .get(&target.name)
            .map(|v| v.value().clone())
            .unwrap_or_default())
    }

    async fn submit(
        &self,
        target: &ExplorerHandle,
        address: &str,
        _meta: &ContractMeta,
    ) -> Result<VerificationToken> {
        self.check(target)?;
        let id = self.next_token.fetch_add(1, Ordering::SeqCst);
        let token = format!("guid-{}", id);
        let address = normalize_address(address);
        self.submissions.insert(address.clone());
        self.queue.insert(
            token.clone(),
            Queued {
                unit: target.name.clone(),
                address,
                polls: 0,
            },
        );
        Ok(VerificationToken::new(token))
    }

    async fn poll_status(
        &self,
        target: &ExplorerHandle,
        token: &VerificationToken,
    ) -> Result<PollStatus> {
        self.check(target)?;
        self.polls.fetch_add(1, Ordering::SeqCst);

        let Some(mut queued) = self.queue.get_mut(token.as_str()) else {
            return Ok(PollStatus::UnknownUid);
        };
        queued.polls += 1;

        match self.behavior {
            PollBehavior::PassAfter(n) if queued.polls >= n => {
                let (unit, address) = (queued.unit.clone(), queued.address.clone());
                drop(queued);
                self.verified.entry(unit).or_default().insert(address);
                Ok(PollStatus::Pass)
            }
            PollBehavior::Fail => Ok(PollStatus::Fail("Fail - Unable to verify".into())),
            _ => Ok(PollStatus::Pending),
        }
    }
}
