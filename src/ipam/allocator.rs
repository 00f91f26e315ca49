use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::ipam::address::{from_int, to_int};
use crate::ipam::error::IpamError;
use crate::ipam::ledger::NewIp;
use crate::ipam::model::{DeviceId, IpAddress, IpId, IpStatus, PoolId, SubnetId};
use crate::ipam::store::{State, Store};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct AllocationRequest {
    pub subnet_id: SubnetId,
    pub pool_id: Option<PoolId>,
    pub status: IpStatus,
    pub device_id: Option<DeviceId>,
    pub interface_name: Option<String>,
    pub hostname: Option<String>,
}

impl AllocationRequest {
    pub fn new(subnet_id: SubnetId) -> AllocationRequest {
        return AllocationRequest {
            subnet_id: subnet_id,
            pool_id: None,
            status: IpStatus::Allocated,
            device_id: None,
            interface_name: None,
            hostname: None,
        };
    }
}

/// Lowest address in `[first, last]` that is neither `gateway` nor a key
/// of `taken`. Walks the gaps between taken addresses instead of probing
/// every candidate.
pub fn first_free(
    first: u32,
    last: u32,
    gateway: Option<u32>,
    taken: Option<&BTreeMap<u32, IpId>>,
) -> Option<u32> {
    if first > last {
        return None;
    }
    // u64 so stepping past 255.255.255.255 cannot wrap
    let skip_gateway = |candidate: u64| -> u64 {
        match gateway {
            Some(gateway) if gateway as u64 == candidate => candidate + 1,
            _ => candidate,
        }
    };

    let mut candidate = skip_gateway(first as u64);
    if let Some(taken) = taken {
        for addr in taken.range(first..=last).map(|(addr, _)| *addr as u64) {
            if addr > candidate {
                break;
            }
            if addr == candidate {
                candidate = skip_gateway(candidate + 1);
            }
        }
    }
    if candidate <= last as u64 {
        return Some(candidate as u32);
    }
    return None;
}

fn find_next_locked(
    state: &State,
    subnet_id: SubnetId,
    pool_id: Option<PoolId>,
) -> Result<Ipv4Addr, IpamError> {
    let (subnet, block) = state.subnet_block(subnet_id)?;
    let (mut first, mut last) = block.usable_range();
    if let Some(pool_id) = pool_id {
        let pool = state.pool(pool_id)?;
        if pool.subnet_id != subnet_id {
            return Err(IpamError::PoolNotFound(pool_id));
        }
        let (start, end) = pool.bounds();
        first = first.max(start);
        last = last.min(end);
    }

    match first_free(
        first,
        last,
        subnet.gateway.map(to_int),
        state.taken(subnet_id),
    ) {
        Some(addr) => return Ok(from_int(addr)),
        None => return Err(IpamError::PoolExhausted),
    }
}

/// Hands out the lowest free address of a subnet or pool.
///
/// The search runs under a read guard which is released before the create
/// step, so two callers can pick the same candidate. The create re-checks
/// uniqueness under the write guard; the loser searches again, up to
/// `max_attempts` times.
pub struct Allocator {
    store: Arc<Store>,
    max_attempts: u32,
    logger: slog::Logger,
}

impl Allocator {
    pub fn new(store: Arc<Store>, max_attempts: u32, logger: &slog::Logger) -> Allocator {
        return Allocator {
            store: store,
            max_attempts: max_attempts.max(1),
            logger: logger.new(o!("module" => "allocator")),
        };
    }

    pub async fn find_next(
        &self,
        subnet_id: SubnetId,
        pool_id: Option<PoolId>,
    ) -> Result<Ipv4Addr, IpamError> {
        let state = self.store.read().await;
        return find_next_locked(&state, subnet_id, pool_id);
    }

    pub async fn allocate(&self, request: AllocationRequest) -> Result<IpAddress, IpamError> {
        return self.allocate_with(request, |_, _| {}).await;
    }

    // `interleave` runs under the write guard after the search, where another
    // writer may already have claimed the candidate.
    async fn allocate_with<F>(
        &self,
        request: AllocationRequest,
        mut interleave: F,
    ) -> Result<IpAddress, IpamError>
    where
        F: FnMut(&mut State, Ipv4Addr),
    {
        let logger = self.logger.new(o!("routine" => "allocate"));
        if request.status == IpStatus::Discovered {
            return Err(IpamError::InvalidStatus(request.status));
        }

        for attempt in 1..=self.max_attempts {
            let address = self.find_next(request.subnet_id, request.pool_id).await?;
            let mut state = self.store.write().await;
            interleave(&mut *state, address);
            let new = NewIp {
                device_id: request.device_id,
                interface_name: request.interface_name.clone(),
                hostname: request.hostname.clone(),
                ..NewIp::new(request.subnet_id, address, request.status)
            };
            match state.insert_ip(new) {
                Ok(record) => {
                    info!(
                        logger, "Allocated address";
                        "address" => %record.address, "status" => %record.status,
                        "attempt" => attempt
                    );
                    return Ok(record);
                }
                Err(IpamError::DuplicateAddress(taken)) => {
                    debug!(logger, "Lost race for {}, retrying", taken; "attempt" => attempt);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        warn!(
            logger, "Giving up on allocation";
            "subnet" => request.subnet_id, "attempts" => self.max_attempts
        );
        return Err(IpamError::AllocationContention(self.max_attempts));
    }
}
