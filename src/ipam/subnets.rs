use serde_derive::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::ipam::address::Block;
use crate::ipam::error::IpamError;
use crate::ipam::model::{IpStatus, Subnet, SubnetId, SubnetStats};
use crate::ipam::store::{State, Store};

const IDLE: &str = "Idle";

pub struct NewSubnet {
    pub name: String,
    pub network_address: Ipv4Addr,
    pub prefix_length: u32,
    pub gateway: Option<Ipv4Addr>,
    pub vlan_id: Option<u16>,
    pub description: Option<String>,
    pub tags: Option<String>,
}

/// Partial update. `Some(None)` clears a nullable field.
#[derive(Default)]
pub struct SubnetChanges {
    pub name: Option<String>,
    pub network_address: Option<Ipv4Addr>,
    pub prefix_length: Option<u32>,
    pub gateway: Option<Option<Ipv4Addr>>,
    pub vlan_id: Option<Option<u16>>,
    pub description: Option<Option<String>>,
    pub tags: Option<Option<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubnetView {
    #[serde(flatten)]
    pub subnet: Subnet,
    pub stats: SubnetStats,
}

/// Occupancy derived from the ledger. Free means an address `find_next`
/// could hand out: usable, not the gateway, and without a row.
pub fn subnet_stats(state: &State, subnet: &Subnet, block: &Block) -> SubnetStats {
    let mut stats = SubnetStats {
        total: block.size(),
        usable: block.usable_count(),
        ..SubnetStats::default()
    };
    let mut rows = 0u64;
    for ip in state.ips_in(subnet.id) {
        rows += 1;
        match ip.status {
            IpStatus::Allocated | IpStatus::Reserved => stats.assigned += 1,
            IpStatus::Discovered => stats.discovered += 1,
            IpStatus::DhcpPool => {}
        }
    }
    let gateway_held = match subnet.gateway {
        Some(gateway) => block.is_usable(gateway) && state.ip_at(subnet.id, gateway).is_none(),
        None => false,
    };
    stats.free = stats.usable.saturating_sub(rows + gateway_held as u64);
    return stats;
}

fn validate(
    state: &State,
    block: &Block,
    gateway: Option<Ipv4Addr>,
    own_id: Option<SubnetId>,
) -> Result<(), IpamError> {
    if let Some(gateway) = gateway {
        if !block.contains(gateway) {
            return Err(IpamError::RangeOutOfBounds {
                start: gateway,
                end: gateway,
            });
        }
    }
    for other in state.subnets.values() {
        if Some(other.id) == own_id {
            continue;
        }
        if other.block()?.overlaps(block) {
            return Err(IpamError::SubnetOverlap {
                network: block.network(),
                prefix: block.prefix(),
                other: other.name.clone(),
            });
        }
    }
    return Ok(());
}

pub struct Subnets {
    store: Arc<Store>,
    logger: slog::Logger,
}

impl Subnets {
    pub fn new(store: Arc<Store>, logger: &slog::Logger) -> Subnets {
        return Subnets {
            store: store,
            logger: logger.new(o!("module" => "subnets")),
        };
    }

    pub async fn create(&self, new: NewSubnet) -> Result<SubnetView, IpamError> {
        let block = Block::new(new.network_address, new.prefix_length)?;
        let mut state = self.store.write().await;
        validate(&state, &block, new.gateway, None)?;

        let subnet = Subnet {
            id: state.next_subnet_id(),
            name: new.name,
            network_address: block.network(),
            prefix_length: block.prefix(),
            gateway: new.gateway,
            vlan_id: new.vlan_id,
            description: new.description,
            tags: new.tags,
            last_scan: None,
            scan_status: IDLE.to_string(),
        };
        info!(self.logger, "Created subnet"; "id" => subnet.id, "block" => %block);
        state.subnets.insert(subnet.id, subnet.clone());
        let stats = subnet_stats(&state, &subnet, &block);
        return Ok(SubnetView {
            subnet: subnet,
            stats: stats,
        });
    }

    pub async fn get(&self, id: SubnetId) -> Result<SubnetView, IpamError> {
        let state = self.store.read().await;
        let (subnet, block) = state.subnet_block(id)?;
        return Ok(SubnetView {
            subnet: subnet.clone(),
            stats: subnet_stats(&state, subnet, &block),
        });
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Result<Vec<SubnetView>, IpamError> {
        let state = self.store.read().await;
        let mut views = Vec::new();
        for subnet in state.subnets.values().skip(skip).take(limit) {
            let block = subnet.block()?;
            views.push(SubnetView {
                subnet: subnet.clone(),
                stats: subnet_stats(&state, subnet, &block),
            });
        }
        return Ok(views);
    }

    /// Changing the block is refused if it would strand an existing pool or
    /// IP record outside the new usable range.
    pub async fn update(
        &self,
        id: SubnetId,
        changes: SubnetChanges,
    ) -> Result<SubnetView, IpamError> {
        let mut state = self.store.write().await;
        let current = state.subnet(id)?.clone();

        let network = changes.network_address.unwrap_or(current.network_address);
        let prefix = changes
            .prefix_length
            .unwrap_or(current.prefix_length as u32);
        let gateway = changes.gateway.unwrap_or(current.gateway);
        let block = Block::new(network, prefix)?;
        validate(&state, &block, gateway, Some(id))?;

        for pool in state.pools_in(id) {
            if !block.is_usable(pool.start_ip) || !block.is_usable(pool.end_ip) {
                return Err(IpamError::RangeOutOfBounds {
                    start: pool.start_ip,
                    end: pool.end_ip,
                });
            }
        }
        for ip in state.ips_in(id) {
            if !block.is_usable(ip.address) {
                return Err(IpamError::RangeOutOfBounds {
                    start: ip.address,
                    end: ip.address,
                });
            }
        }

        let subnet = Subnet {
            id: id,
            name: changes.name.unwrap_or(current.name),
            network_address: block.network(),
            prefix_length: block.prefix(),
            gateway: gateway,
            vlan_id: changes.vlan_id.unwrap_or(current.vlan_id),
            description: changes.description.unwrap_or(current.description),
            tags: changes.tags.unwrap_or(current.tags),
            last_scan: current.last_scan,
            scan_status: current.scan_status,
        };
        state.subnets.insert(id, subnet.clone());
        debug!(self.logger, "Updated subnet"; "id" => id);
        let stats = subnet_stats(&state, &subnet, &block);
        return Ok(SubnetView {
            subnet: subnet,
            stats: stats,
        });
    }

    /// Refused while any address is ALLOCATED or RESERVED, otherwise pools
    /// and IP records go with the subnet.
    pub async fn delete(&self, id: SubnetId) -> Result<Subnet, IpamError> {
        let mut state = self.store.write().await;
        state.subnet(id)?;
        if state.ips_in(id).iter().any(|ip| ip.status.authoritative()) {
            return Err(IpamError::SubnetInUse(id));
        }

        let ip_ids: Vec<_> = state.ips_in(id).iter().map(|ip| ip.id).collect();
        for ip_id in ip_ids.iter() {
            state.remove_ip(*ip_id);
        }
        state.pools.retain(|_, pool| pool.subnet_id != id);
        let subnet = state.subnets.remove(&id).ok_or(IpamError::SubnetNotFound(id))?;
        info!(
            self.logger, "Deleted subnet";
            "id" => id, "cascaded_ips" => ip_ids.len()
        );
        return Ok(subnet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipam::ledger::NewIp;

    fn logger() -> slog::Logger {
        return slog::Logger::root(slog::Discard, o!());
    }

    pub fn new_subnet(name: &str, network: [u8; 4], prefix: u32) -> NewSubnet {
        return NewSubnet {
            name: name.to_string(),
            network_address: Ipv4Addr::from(network),
            prefix_length: prefix,
            gateway: None,
            vlan_id: None,
            description: None,
            tags: None,
        };
    }

    #[tokio::test]
    async fn create_validates_block() {
        let subnets = Subnets::new(Arc::new(Store::new()), &logger());

        let view = subnets
            .create(new_subnet("lan", [192, 168, 1, 0], 24))
            .await
            .unwrap();
        assert_eq!(view.subnet.scan_status, "Idle");
        assert_eq!(view.stats.total, 256);
        assert_eq!(view.stats.usable, 254);
        assert_eq!(view.stats.free, 254);

        match subnets.create(new_subnet("bad", [10, 0, 0, 1], 24)).await {
            Err(IpamError::NetworkNotAligned { .. }) => {}
            other => assert!(false, "Expected NetworkNotAligned, got {:?}", other),
        }
        match subnets.create(new_subnet("bad", [10, 0, 0, 0], 40)).await {
            Err(IpamError::InvalidPrefix(40)) => {}
            other => assert!(false, "Expected InvalidPrefix, got {:?}", other),
        }
        match subnets.create(new_subnet("inner", [192, 168, 1, 128], 25)).await {
            Err(IpamError::SubnetOverlap { other, .. }) => assert_eq!(other, "lan"),
            other => assert!(false, "Expected SubnetOverlap, got {:?}", other),
        }

        let mut outside_gateway = new_subnet("dmz", [10, 1, 0, 0], 24);
        outside_gateway.gateway = Some(Ipv4Addr::new(10, 2, 0, 1));
        match subnets.create(outside_gateway).await {
            Err(IpamError::RangeOutOfBounds { .. }) => {}
            other => assert!(false, "Expected RangeOutOfBounds, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stats_count_rows_by_status() {
        let store = Arc::new(Store::new());
        let subnets = Subnets::new(store.clone(), &logger());
        let mut lan = new_subnet("lan", [10, 0, 0, 0], 29);
        lan.gateway = Some(Ipv4Addr::new(10, 0, 0, 1));
        let id = subnets.create(lan).await.unwrap().subnet.id;

        {
            let mut state = store.write().await;
            for (last, status) in [
                (2, IpStatus::Allocated),
                (3, IpStatus::Reserved),
                (4, IpStatus::Discovered),
                (5, IpStatus::DhcpPool),
            ]
            .iter()
            {
                state
                    .insert_ip(NewIp::new(id, Ipv4Addr::new(10, 0, 0, *last), *status))
                    .unwrap();
            }
        }

        let stats = subnets.get(id).await.unwrap().stats;
        assert_eq!(stats.usable, 6);
        assert_eq!(stats.assigned, 2);
        assert_eq!(stats.discovered, 1);
        // .6 is the only address left once the gateway is excluded
        assert_eq!(stats.free, 1);
    }

    #[tokio::test]
    async fn delete_refused_while_allocated() {
        let store = Arc::new(Store::new());
        let subnets = Subnets::new(store.clone(), &logger());
        let id = subnets
            .create(new_subnet("lan", [10, 0, 0, 0], 24))
            .await
            .unwrap()
            .subnet
            .id;

        let allocated = store
            .write()
            .await
            .insert_ip(NewIp::new(id, Ipv4Addr::new(10, 0, 0, 5), IpStatus::Allocated))
            .unwrap();
        store
            .write()
            .await
            .insert_ip(NewIp::new(id, Ipv4Addr::new(10, 0, 0, 6), IpStatus::Discovered))
            .unwrap();

        assert_eq!(subnets.delete(id).await, Err(IpamError::SubnetInUse(id)));

        store.write().await.remove_ip(allocated.id);
        subnets.delete(id).await.unwrap();

        let state = store.read().await;
        assert!(state.ips.is_empty());
        assert!(state.taken(id).is_none());
        assert_eq!(state.subnet(id).err(), Some(IpamError::SubnetNotFound(id)));
    }

    #[tokio::test]
    async fn update_cannot_strand_records() {
        let store = Arc::new(Store::new());
        let subnets = Subnets::new(store.clone(), &logger());
        let id = subnets
            .create(new_subnet("lan", [10, 0, 0, 0], 24))
            .await
            .unwrap()
            .subnet
            .id;
        store
            .write()
            .await
            .insert_ip(NewIp::new(id, Ipv4Addr::new(10, 0, 0, 200), IpStatus::Reserved))
            .unwrap();

        let shrink = SubnetChanges {
            prefix_length: Some(25),
            ..SubnetChanges::default()
        };
        match subnets.update(id, shrink).await {
            Err(IpamError::RangeOutOfBounds { start, .. }) => {
                assert_eq!(start, Ipv4Addr::new(10, 0, 0, 200))
            }
            other => assert!(false, "Expected RangeOutOfBounds, got {:?}", other),
        }

        let rename = SubnetChanges {
            name: Some("office".to_string()),
            description: Some(Some("first floor".to_string())),
            ..SubnetChanges::default()
        };
        let view = subnets.update(id, rename).await.unwrap();
        assert_eq!(view.subnet.name, "office");
        assert_eq!(view.subnet.description.as_deref(), Some("first floor"));
        assert_eq!(view.stats.assigned, 1);
    }
}
