use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::ipam::error::IpamError;
use crate::ipam::model::{DeviceId, IpAddress, IpId, IpStatus, SubnetId};
use crate::ipam::store::{State, Store};

/// A row to be created.
#[derive(Clone, Debug, PartialEq)]
pub struct NewIp {
    pub subnet_id: SubnetId,
    pub address: Ipv4Addr,
    pub status: IpStatus,
    pub device_id: Option<DeviceId>,
    pub interface_name: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub healthcheck_status: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl NewIp {
    pub fn new(subnet_id: SubnetId, address: Ipv4Addr, status: IpStatus) -> NewIp {
        return NewIp {
            subnet_id: subnet_id,
            address: address,
            status: status,
            device_id: None,
            interface_name: None,
            mac_address: None,
            hostname: None,
            healthcheck_status: None,
            last_seen: None,
        };
    }
}

/// Partial update of an IP record. `Some(None)` clears a field, so
/// `device_id: Some(None)` is the unassign operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IpChanges {
    // Only accepted when equal to the current address
    pub address: Option<Ipv4Addr>,
    pub status: Option<IpStatus>,
    pub device_id: Option<Option<DeviceId>>,
    pub interface_name: Option<Option<String>>,
    pub mac_address: Option<Option<String>>,
    pub hostname: Option<Option<String>>,
    pub healthcheck_status: Option<Option<String>>,
}

pub(crate) fn apply_changes(
    state: &mut State,
    id: IpId,
    changes: IpChanges,
) -> Result<IpAddress, IpamError> {
    let current = state.ip(id)?;
    if let Some(address) = changes.address {
        if address != current.address {
            return Err(IpamError::AddressImmutable);
        }
    }
    let status = changes.status.unwrap_or(current.status);
    let device_id = changes.device_id.unwrap_or(current.device_id);
    if let Some(device_id) = device_id {
        if !status.authoritative() {
            return Err(IpamError::InvalidBinding(status));
        }
        state.device(device_id)?;
    }

    let record = state.ip_mut(id)?;
    record.status = status;
    record.device_id = device_id;
    if let Some(interface_name) = changes.interface_name {
        record.interface_name = interface_name;
    }
    if let Some(mac_address) = changes.mac_address {
        record.mac_address = mac_address;
    }
    if let Some(hostname) = changes.hostname {
        record.hostname = hostname;
    }
    if let Some(healthcheck_status) = changes.healthcheck_status {
        record.healthcheck_status = healthcheck_status;
    }
    return Ok(record.clone());
}

/// Bind a device to an existing row. DISCOVERED rows are promoted to
/// ALLOCATED; ALLOCATED and RESERVED rows keep their status as long as no
/// other device holds them.
pub(crate) fn bind_device(
    state: &mut State,
    id: IpId,
    device_id: DeviceId,
    interface_name: Option<String>,
) -> Result<IpAddress, IpamError> {
    state.device(device_id)?;
    let current = state.ip(id)?;
    let status = match current.status {
        IpStatus::Discovered => IpStatus::Allocated,
        IpStatus::Allocated | IpStatus::Reserved => match current.device_id {
            Some(holder) if holder != device_id => {
                return Err(IpamError::AddressInUse(current.address))
            }
            _ => current.status,
        },
        IpStatus::DhcpPool => return Err(IpamError::AddressInUse(current.address)),
    };

    let record = state.ip_mut(id)?;
    record.status = status;
    record.device_id = Some(device_id);
    if interface_name.is_some() {
        record.interface_name = interface_name;
    }
    return Ok(record.clone());
}

/// The authoritative set of IP records.
pub struct Ledger {
    store: Arc<Store>,
    logger: slog::Logger,
}

impl Ledger {
    pub fn new(store: Arc<Store>, logger: &slog::Logger) -> Ledger {
        return Ledger {
            store: store,
            logger: logger.new(o!("module" => "ledger")),
        };
    }

    pub async fn create(&self, new: NewIp) -> Result<IpAddress, IpamError> {
        let mut state = self.store.write().await;
        let record = state.insert_ip(new)?;
        info!(
            self.logger, "Created IP record";
            "address" => %record.address, "status" => %record.status
        );
        return Ok(record);
    }

    pub async fn reserve(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<IpAddress, IpamError> {
        return self
            .create(NewIp::new(subnet_id, address, IpStatus::Reserved))
            .await;
    }

    pub async fn get(&self, id: IpId) -> Result<IpAddress, IpamError> {
        let state = self.store.read().await;
        return Ok(state.ip(id)?.clone());
    }

    /// Records ordered by subnet then address.
    pub async fn list(
        &self,
        subnet_id: Option<SubnetId>,
        skip: usize,
        limit: usize,
    ) -> Vec<IpAddress> {
        let state = self.store.read().await;
        match subnet_id {
            Some(subnet_id) => {
                return state
                    .ips_in(subnet_id)
                    .into_iter()
                    .skip(skip)
                    .take(limit)
                    .cloned()
                    .collect();
            }
            None => {
                let mut records: Vec<&IpAddress> = state.ips.values().collect();
                records.sort_by_key(|ip| (ip.subnet_id, u32::from(ip.address)));
                return records.into_iter().skip(skip).take(limit).cloned().collect();
            }
        }
    }

    pub async fn update(&self, id: IpId, changes: IpChanges) -> Result<IpAddress, IpamError> {
        let mut state = self.store.write().await;
        let record = apply_changes(&mut state, id, changes)?;
        debug!(self.logger, "Updated IP record"; "address" => %record.address);
        return Ok(record);
    }

    /// Drop the device binding, keeping the row and its status.
    pub async fn unassign(&self, id: IpId) -> Result<IpAddress, IpamError> {
        return self
            .update(
                id,
                IpChanges {
                    device_id: Some(None),
                    ..IpChanges::default()
                },
            )
            .await;
    }

    pub async fn promote(
        &self,
        id: IpId,
        device_id: DeviceId,
        interface_name: Option<String>,
    ) -> Result<IpAddress, IpamError> {
        let mut state = self.store.write().await;
        let record = bind_device(&mut state, id, device_id, interface_name)?;
        info!(
            self.logger, "Bound IP record to device";
            "address" => %record.address, "device" => device_id
        );
        return Ok(record);
    }

    /// Unconditional; the device binding goes with the row.
    pub async fn delete(&self, id: IpId) -> Result<IpAddress, IpamError> {
        let mut state = self.store.write().await;
        let record = state.remove_ip(id).ok_or(IpamError::IpNotFound(id))?;
        info!(self.logger, "Deleted IP record"; "address" => %record.address);
        return Ok(record);
    }
}
