use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::ipam::address::{ranges_overlap, to_int};
use crate::ipam::error::IpamError;
use crate::ipam::model::{Pool, PoolId, PoolPurpose, SubnetId};
use crate::ipam::store::{State, Store};

pub struct NewPool {
    pub subnet_id: SubnetId,
    pub name: String,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
    pub purpose: PoolPurpose,
    pub description: Option<String>,
}

#[derive(Default)]
pub struct PoolChanges {
    pub name: Option<String>,
    pub start_ip: Option<Ipv4Addr>,
    pub end_ip: Option<Ipv4Addr>,
    pub purpose: Option<PoolPurpose>,
    pub description: Option<Option<String>>,
}

fn validate_range(
    state: &State,
    subnet_id: SubnetId,
    start: Ipv4Addr,
    end: Ipv4Addr,
    own_id: Option<PoolId>,
) -> Result<(), IpamError> {
    let (_, block) = state.subnet_block(subnet_id)?;
    if to_int(start) > to_int(end) || !block.is_usable(start) || !block.is_usable(end) {
        return Err(IpamError::RangeOutOfBounds {
            start: start,
            end: end,
        });
    }
    for sibling in state.pools_in(subnet_id) {
        if Some(sibling.id) == own_id {
            continue;
        }
        if ranges_overlap((to_int(start), to_int(end)), sibling.bounds()) {
            return Err(IpamError::RangeOverlap {
                start: start,
                end: end,
                other: sibling.name.clone(),
            });
        }
    }
    return Ok(());
}

/// Named, non-overlapping sub-ranges of a subnet.
pub struct PoolRegistry {
    store: Arc<Store>,
    logger: slog::Logger,
}

impl PoolRegistry {
    pub fn new(store: Arc<Store>, logger: &slog::Logger) -> PoolRegistry {
        return PoolRegistry {
            store: store,
            logger: logger.new(o!("module" => "pools")),
        };
    }

    pub async fn create(&self, new: NewPool) -> Result<Pool, IpamError> {
        let mut state = self.store.write().await;
        validate_range(&state, new.subnet_id, new.start_ip, new.end_ip, None)?;
        let pool = Pool {
            id: state.next_pool_id(),
            subnet_id: new.subnet_id,
            name: new.name,
            start_ip: new.start_ip,
            end_ip: new.end_ip,
            purpose: new.purpose,
            description: new.description,
        };
        info!(
            self.logger, "Created range {}", pool.name;
            "start" => %pool.start_ip, "end" => %pool.end_ip
        );
        state.pools.insert(pool.id, pool.clone());
        return Ok(pool);
    }

    pub async fn get(&self, id: PoolId) -> Result<Pool, IpamError> {
        let state = self.store.read().await;
        return Ok(state.pool(id)?.clone());
    }

    /// Ordered by start address.
    pub async fn list_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Pool>, IpamError> {
        let state = self.store.read().await;
        state.subnet(subnet_id)?;
        return Ok(state.pools_in(subnet_id).into_iter().cloned().collect());
    }

    pub async fn find_containing(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<Option<Pool>, IpamError> {
        let state = self.store.read().await;
        state.subnet(subnet_id)?;
        return Ok(state
            .pools_in(subnet_id)
            .into_iter()
            .find(|pool| pool.contains(address))
            .cloned());
    }

    pub async fn update(&self, id: PoolId, changes: PoolChanges) -> Result<Pool, IpamError> {
        let mut state = self.store.write().await;
        let current = state.pool(id)?.clone();
        let start = changes.start_ip.unwrap_or(current.start_ip);
        let end = changes.end_ip.unwrap_or(current.end_ip);
        validate_range(&state, current.subnet_id, start, end, Some(id))?;

        let pool = Pool {
            name: changes.name.unwrap_or(current.name),
            start_ip: start,
            end_ip: end,
            purpose: changes.purpose.unwrap_or(current.purpose),
            description: changes.description.unwrap_or(current.description),
            ..current
        };
        state.pools.insert(id, pool.clone());
        debug!(self.logger, "Updated range {}", pool.name);
        return Ok(pool);
    }

    /// IP records inside the range are not touched.
    pub async fn delete(&self, id: PoolId) -> Result<Pool, IpamError> {
        let mut state = self.store.write().await;
        let pool = state.pools.remove(&id).ok_or(IpamError::PoolNotFound(id))?;
        info!(self.logger, "Deleted range {}", pool.name);
        return Ok(pool);
    }
}
