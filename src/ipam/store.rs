use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ipam::address::{to_int, Block};
use crate::ipam::error::IpamError;
use crate::ipam::ledger::NewIp;
use crate::ipam::model::{
    Device, DeviceId, DiscoverySettings, IpAddress, IpId, Pool, PoolId, Subnet, SubnetId,
};

#[derive(Default)]
struct Counters {
    subnet: u64,
    pool: u64,
    ip: u64,
    device: u64,
}

/// Everything the engine knows. Only reachable through a `Store` guard.
#[derive(Default)]
pub struct State {
    pub subnets: BTreeMap<SubnetId, Subnet>,
    pub pools: BTreeMap<PoolId, Pool>,
    pub ips: BTreeMap<IpId, IpAddress>,
    pub devices: BTreeMap<DeviceId, Device>,
    pub settings: DiscoverySettings,

    // Per subnet: address -> IP record, the uniqueness constraint
    by_address: HashMap<SubnetId, BTreeMap<u32, IpId>>,
    counters: Counters,
}

impl State {
    pub fn next_subnet_id(&mut self) -> SubnetId {
        self.counters.subnet += 1;
        return self.counters.subnet;
    }

    pub fn next_pool_id(&mut self) -> PoolId {
        self.counters.pool += 1;
        return self.counters.pool;
    }

    pub fn next_device_id(&mut self) -> DeviceId {
        self.counters.device += 1;
        return self.counters.device;
    }

    pub fn subnet(&self, id: SubnetId) -> Result<&Subnet, IpamError> {
        return self.subnets.get(&id).ok_or(IpamError::SubnetNotFound(id));
    }

    pub fn subnet_block(&self, id: SubnetId) -> Result<(&Subnet, Block), IpamError> {
        let subnet = self.subnet(id)?;
        return Ok((subnet, subnet.block()?));
    }

    /// The subnet whose block contains `addr`. Subnets never overlap, so
    /// there is at most one.
    pub fn subnet_containing(&self, addr: Ipv4Addr) -> Option<&Subnet> {
        return self
            .subnets
            .values()
            .find(|subnet| subnet.block().map(|b| b.contains(addr)).unwrap_or(false));
    }

    pub fn pool(&self, id: PoolId) -> Result<&Pool, IpamError> {
        return self.pools.get(&id).ok_or(IpamError::PoolNotFound(id));
    }

    /// Pools of a subnet ordered by start address.
    pub fn pools_in(&self, subnet_id: SubnetId) -> Vec<&Pool> {
        let mut pools: Vec<&Pool> = self
            .pools
            .values()
            .filter(|pool| pool.subnet_id == subnet_id)
            .collect();
        pools.sort_by_key(|pool| pool.bounds());
        return pools;
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device, IpamError> {
        return self.devices.get(&id).ok_or(IpamError::DeviceNotFound(id));
    }

    pub fn ip(&self, id: IpId) -> Result<&IpAddress, IpamError> {
        return self.ips.get(&id).ok_or(IpamError::IpNotFound(id));
    }

    pub fn ip_mut(&mut self, id: IpId) -> Result<&mut IpAddress, IpamError> {
        return self.ips.get_mut(&id).ok_or(IpamError::IpNotFound(id));
    }

    /// Addresses of a subnet that have a row, in ascending order.
    pub fn taken(&self, subnet_id: SubnetId) -> Option<&BTreeMap<u32, IpId>> {
        return self.by_address.get(&subnet_id);
    }

    pub fn ip_at(&self, subnet_id: SubnetId, addr: Ipv4Addr) -> Option<&IpAddress> {
        let id = self.by_address.get(&subnet_id)?.get(&to_int(addr))?;
        return self.ips.get(id);
    }

    pub fn ip_id_at(&self, subnet_id: SubnetId, addr: Ipv4Addr) -> Option<IpId> {
        return self
            .by_address
            .get(&subnet_id)
            .and_then(|index| index.get(&to_int(addr)).copied());
    }

    /// IP records of a subnet ordered by address.
    pub fn ips_in(&self, subnet_id: SubnetId) -> Vec<&IpAddress> {
        match self.by_address.get(&subnet_id) {
            Some(index) => return index.values().filter_map(|id| self.ips.get(id)).collect(),
            None => return Vec::new(),
        }
    }

    /// Create-if-absent. This is the only place rows are created, and the
    /// address index check is what makes concurrent allocation safe.
    pub fn insert_ip(&mut self, new: NewIp) -> Result<IpAddress, IpamError> {
        let (_, block) = self.subnet_block(new.subnet_id)?;
        if !block.is_usable(new.address) {
            return Err(IpamError::RangeOutOfBounds {
                start: new.address,
                end: new.address,
            });
        }
        if let Some(device_id) = new.device_id {
            if !new.status.authoritative() {
                return Err(IpamError::InvalidBinding(new.status));
            }
            self.device(device_id)?;
        }
        if self.ip_id_at(new.subnet_id, new.address).is_some() {
            return Err(IpamError::DuplicateAddress(new.address));
        }

        self.counters.ip += 1;
        let record = IpAddress {
            id: self.counters.ip,
            subnet_id: new.subnet_id,
            address: new.address,
            status: new.status,
            device_id: new.device_id,
            interface_name: new.interface_name,
            mac_address: new.mac_address,
            hostname: new.hostname,
            healthcheck_status: new.healthcheck_status,
            last_seen: new.last_seen,
        };
        self.by_address
            .entry(record.subnet_id)
            .or_default()
            .insert(to_int(record.address), record.id);
        self.ips.insert(record.id, record.clone());
        return Ok(record);
    }

    pub fn remove_ip(&mut self, id: IpId) -> Option<IpAddress> {
        let record = self.ips.remove(&id)?;
        if let Some(index) = self.by_address.get_mut(&record.subnet_id) {
            index.remove(&to_int(record.address));
            if index.is_empty() {
                self.by_address.remove(&record.subnet_id);
            }
        }
        return Some(record);
    }
}

/// The single shared mutable resource. Components hold an `Arc<Store>`.
pub struct Store {
    state: RwLock<State>,
}

impl Store {
    pub fn new() -> Store {
        return Store {
            state: RwLock::new(State::default()),
        };
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, State> {
        return self.state.read().await;
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, State> {
        return self.state.write().await;
    }
}

impl Default for Store {
    fn default() -> Self {
        return Store::new();
    }
}
