//! Host port allocation and per-unit exclusion

use crate::error::{EngineError, EngineResult};
use scout_types::UnitName;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};

const ALLOCATION_ATTEMPTS: usize = 16;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ask the OS for a free ephemeral port and release it
fn ephemeral_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Process-wide registry of ports handed out by this process
#[derive(Debug, Clone, Default)]
pub struct PortAllocator {
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a lease; its ports are released when it is dropped
    pub fn lease(&self) -> PortLease {
        PortLease {
            reserved: self.reserved.clone(),
            held: Vec::new(),
        }
    }

    /// Ports held by live leases or committed ones
    pub fn reserved(&self) -> HashSet<u16> {
        lock(&self.reserved).clone()
    }
}

/// Ports reserved for one in-flight provisioning
#[derive(Debug)]
pub struct PortLease {
    reserved: Arc<Mutex<HashSet<u16>>>,
    held: Vec<u16>,
}

impl PortLease {
    /// Allocate an ephemeral port that is neither in `used` nor reserved
    pub fn allocate(&mut self, used: &HashSet<u16>) -> EngineResult<u16> {
        self.allocate_from(used, ephemeral_port)
    }

    fn allocate_from<F>(&mut self, used: &HashSet<u16>, mut candidate: F) -> EngineResult<u16>
    where
        F: FnMut() -> std::io::Result<u16>,
    {
        for _ in 0..ALLOCATION_ATTEMPTS {
            let port = candidate().map_err(|e| EngineError::PortAllocation(e.to_string()))?;
            if used.contains(&port) {
                continue;
            }
            let mut reserved = lock(&self.reserved);
            if reserved.insert(port) {
                self.held.push(port);
                return Ok(port);
            }
        }
        Err(EngineError::PortAllocation(format!(
            "no free port after {} attempts",
            ALLOCATION_ATTEMPTS
        )))
    }

    /// Hold a port that is already in use by this unit
    pub fn reserve(&mut self, port: u16) {
        if lock(&self.reserved).insert(port) {
            self.held.push(port);
        }
    }

    pub fn held(&self) -> &[u16] {
        &self.held
    }

    /// Keep the held ports reserved for the life of the allocator.
    ///
    /// Called once they are recorded, so a unit working from an older store
    /// snapshot cannot be handed the same port.
    pub fn commit(mut self) {
        self.held.clear();
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        let mut reserved = lock(&self.reserved);
        for port in &self.held {
            reserved.remove(port);
        }
    }
}

/// Units with an action in flight
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    units: Arc<Mutex<HashSet<UnitName>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, or `None` if another action holds it
    pub fn try_acquire(&self, name: &UnitName) -> Option<InFlightGuard> {
        if lock(&self.units).insert(name.clone()) {
            Some(InFlightGuard {
                units: self.units.clone(),
                name: name.clone(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, name: &UnitName) -> bool {
        lock(&self.units).contains(name)
    }
}

/// Releases the unit claim on drop
#[derive(Debug)]
pub struct InFlightGuard {
    units: Arc<Mutex<HashSet<UnitName>>>,
    name: UnitName,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.units).remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_reserves_until_dropped() {
        let allocator = PortAllocator::new();
        let port = {
            let mut lease = allocator.lease();
            let port = lease.allocate(&HashSet::new()).unwrap();
            assert!(allocator.reserved().contains(&port));
            port
        };
        assert!(port > 0);
        assert!(allocator.reserved().is_empty());
    }

    #[test]
    fn test_concurrent_leases_never_share_ports() {
        let allocator = PortAllocator::new();
        let mut a = allocator.lease();
        let mut b = allocator.lease();
        let used = HashSet::new();

        let mut seen = HashSet::new();
        for _ in 0..4 {
            assert!(seen.insert(a.allocate(&used).unwrap()));
            assert!(seen.insert(b.allocate(&used).unwrap()));
        }
        assert_eq!(allocator.reserved().len(), 8);
    }

    #[test]
    fn test_committed_port_is_not_handed_out_again() {
        let allocator = PortAllocator::new();
        let mut a = allocator.lease();
        let port = a.allocate_from(&HashSet::new(), || Ok(45100)).unwrap();
        a.commit();
        assert!(allocator.reserved().contains(&port));

        // A snapshot of used ports taken before the commit misses 45100.
        let mut candidates = [45100, 45100, 45101].into_iter();
        let mut b = allocator.lease();
        let next = b
            .allocate_from(&HashSet::new(), || Ok(candidates.next().unwrap_or(45102)))
            .unwrap();
        assert_eq!(next, 45101);
    }

    #[test]
    fn test_allocation_skips_used_ports() {
        let allocator = PortAllocator::new();
        let used: HashSet<u16> = [45200].into_iter().collect();
        let mut candidates = [45200, 45201].into_iter();
        let mut lease = allocator.lease();
        let port = lease
            .allocate_from(&used, || Ok(candidates.next().unwrap_or(45202)))
            .unwrap();
        assert_eq!(port, 45201);

        let mut exhausted = allocator.lease();
        assert!(exhausted.allocate_from(&used, || Ok(45200)).is_err());
    }

    #[test]
    fn test_reserve_existing_port() {
        let allocator = PortAllocator::new();
        let mut a = allocator.lease();
        a.reserve(45000);
        a.reserve(45000);
        assert_eq!(a.held(), &[45000]);

        let mut b = allocator.lease();
        b.reserve(45000);
        assert!(b.held().is_empty());
        drop(b);
        assert!(allocator.reserved().contains(&45000));
    }

    #[test]
    fn test_in_flight_exclusion() {
        let inflight = InFlight::new();
        let alpha = UnitName::new("alpha");
        let guard = inflight.try_acquire(&alpha).unwrap();
        assert!(inflight.try_acquire(&alpha).is_none());
        assert!(inflight.contains(&alpha));
        drop(guard);
        assert!(inflight.try_acquire(&alpha).is_some());
    }
}
