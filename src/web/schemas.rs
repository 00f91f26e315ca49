use chrono::{DateTime, Utc};
use serde::Deserializer;
use serde_derive::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::ipam::address::parse_address;
use crate::ipam::allocator::AllocationRequest;
use crate::ipam::devices::{DeviceChanges, NewDevice};
use crate::ipam::ledger::{IpChanges, NewIp};
use crate::ipam::model::{DeviceId, IpStatus, PoolId, PoolPurpose, SubnetId};
use crate::ipam::pools::{NewPool, PoolChanges};
use crate::ipam::reconciler::Observation;
use crate::ipam::subnets::{NewSubnet, SubnetChanges};
use crate::ipam::IpamError;

pub const DEFAULT_LIMIT: usize = 100;
pub const DEFAULT_PURGE_DAYS: u32 = 30;

// Distinguishes an explicit `null` (Some(None)) from an absent field (None)
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    return <Option<T> as serde::Deserialize>::deserialize(deserializer).map(Some);
}

// Forms submit empty strings for unset addresses
fn optional_address(raw: Option<String>) -> Result<Option<Ipv4Addr>, IpamError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => return Ok(Some(parse_address(&raw)?)),
        _ => return Ok(None),
    }
}

#[derive(Serialize)]
pub struct Detail {
    pub detail: String,
}

#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct NextAvailable {
    pub address: Ipv4Addr,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn window(&self) -> (usize, usize) {
        return (self.skip.unwrap_or(0), self.limit.unwrap_or(DEFAULT_LIMIT));
    }
}

#[derive(Deserialize)]
pub struct IpListQuery {
    pub subnet_id: Option<SubnetId>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct NextAvailableQuery {
    // Raw so that `?pool_id=` means no pool
    pub pool_id: Option<String>,
}

#[derive(Deserialize)]
pub struct PurgeQuery {
    pub days: Option<u32>,
}

#[derive(Deserialize)]
pub struct SubnetCreate {
    pub name: String,
    pub network_address: String,
    pub prefix_length: u32,
    pub gateway: Option<String>,
    pub vlan_id: Option<u16>,
    pub description: Option<String>,
    pub tags: Option<String>,
}

impl SubnetCreate {
    pub fn into_new(self) -> Result<NewSubnet, IpamError> {
        return Ok(NewSubnet {
            name: self.name,
            network_address: parse_address(&self.network_address)?,
            prefix_length: self.prefix_length,
            gateway: optional_address(self.gateway)?,
            vlan_id: self.vlan_id,
            description: self.description,
            tags: self.tags,
        });
    }
}

#[derive(Deserialize)]
pub struct SubnetUpdate {
    pub name: Option<String>,
    pub network_address: Option<String>,
    pub prefix_length: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub gateway: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub vlan_id: Option<Option<u16>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Option<Option<String>>,
}

impl SubnetUpdate {
    pub fn into_changes(self) -> Result<SubnetChanges, IpamError> {
        let network_address = match self.network_address {
            Some(raw) => Some(parse_address(&raw)?),
            None => None,
        };
        let gateway = match self.gateway {
            Some(raw) => Some(optional_address(raw)?),
            None => None,
        };
        return Ok(SubnetChanges {
            name: self.name,
            network_address: network_address,
            prefix_length: self.prefix_length,
            gateway: gateway,
            vlan_id: self.vlan_id,
            description: self.description,
            tags: self.tags,
        });
    }
}

#[derive(Deserialize)]
pub struct PoolCreate {
    pub name: String,
    pub start_ip: String,
    pub end_ip: String,
    pub purpose: PoolPurpose,
    pub description: Option<String>,
}

impl PoolCreate {
    pub fn into_new(self, subnet_id: SubnetId) -> Result<NewPool, IpamError> {
        return Ok(NewPool {
            subnet_id: subnet_id,
            name: self.name,
            start_ip: parse_address(&self.start_ip)?,
            end_ip: parse_address(&self.end_ip)?,
            purpose: self.purpose,
            description: self.description,
        });
    }
}

#[derive(Deserialize)]
pub struct PoolUpdate {
    pub name: Option<String>,
    pub start_ip: Option<String>,
    pub end_ip: Option<String>,
    pub purpose: Option<PoolPurpose>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

impl PoolUpdate {
    pub fn into_changes(self) -> Result<PoolChanges, IpamError> {
        return Ok(PoolChanges {
            name: self.name,
            start_ip: optional_address(self.start_ip)?,
            end_ip: optional_address(self.end_ip)?,
            purpose: self.purpose,
            description: self.description,
        });
    }
}

fn default_status() -> IpStatus {
    IpStatus::Allocated
}

#[derive(Deserialize)]
pub struct IpCreate {
    pub address: String,
    #[serde(default = "default_status")]
    pub status: IpStatus,
    pub subnet_id: SubnetId,
    pub device_id: Option<DeviceId>,
    pub interface_name: Option<String>,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
    pub healthcheck_status: Option<String>,
}

impl IpCreate {
    pub fn into_new(self) -> Result<NewIp, IpamError> {
        return Ok(NewIp {
            device_id: self.device_id,
            interface_name: self.interface_name,
            hostname: self.hostname,
            mac_address: self.mac_address,
            healthcheck_status: self.healthcheck_status,
            ..NewIp::new(self.subnet_id, parse_address(&self.address)?, self.status)
        });
    }
}

#[derive(Deserialize)]
pub struct IpUpdate {
    pub address: Option<String>,
    pub status: Option<IpStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub device_id: Option<Option<DeviceId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub interface_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub mac_address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub hostname: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub healthcheck_status: Option<Option<String>>,
}

impl IpUpdate {
    pub fn into_changes(self) -> Result<IpChanges, IpamError> {
        let address = match self.address {
            Some(raw) => Some(parse_address(&raw)?),
            None => None,
        };
        return Ok(IpChanges {
            address: address,
            status: self.status,
            device_id: self.device_id,
            interface_name: self.interface_name,
            mac_address: self.mac_address,
            hostname: self.hostname,
            healthcheck_status: self.healthcheck_status,
        });
    }
}

#[derive(Default, Deserialize)]
pub struct AllocateBody {
    pub pool_id: Option<PoolId>,
    pub status: Option<IpStatus>,
    pub device_id: Option<DeviceId>,
    pub interface_name: Option<String>,
    pub hostname: Option<String>,
}

impl AllocateBody {
    pub fn into_request(self, subnet_id: SubnetId) -> AllocationRequest {
        return AllocationRequest {
            subnet_id: subnet_id,
            pool_id: self.pool_id,
            status: self.status.unwrap_or(IpStatus::Allocated),
            device_id: self.device_id,
            interface_name: self.interface_name,
            hostname: self.hostname,
        };
    }
}

#[derive(Deserialize)]
pub struct DeviceCreate {
    pub hostname: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device_type: Option<String>,
    pub tags: Option<String>,
    pub notes: Option<String>,
    pub ip_address: Option<String>,
}

impl DeviceCreate {
    pub fn into_new(self) -> Result<NewDevice, IpamError> {
        return Ok(NewDevice {
            hostname: self.hostname,
            manufacturer: self.manufacturer,
            model: self.model,
            device_type: self.device_type,
            tags: self.tags,
            notes: self.notes,
            ip_address: optional_address(self.ip_address)?,
        });
    }
}

#[derive(Deserialize)]
pub struct DeviceUpdate {
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub manufacturer: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub model: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub device_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub ip_address: Option<String>,
}

impl DeviceUpdate {
    pub fn into_changes(self) -> Result<DeviceChanges, IpamError> {
        return Ok(DeviceChanges {
            hostname: self.hostname,
            manufacturer: self.manufacturer,
            model: self.model,
            device_type: self.device_type,
            tags: self.tags,
            notes: self.notes,
            ip_address: optional_address(self.ip_address)?,
        });
    }
}

#[derive(Deserialize)]
pub struct Assignment {
    pub ip_address: String,
    pub interface_name: Option<String>,
}

/// A scanner report. `observed_at` defaults to the time of receipt.
#[derive(Deserialize)]
pub struct ObservationBody {
    pub address: String,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub healthcheck_status: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl ObservationBody {
    pub fn into_observation(self, received_at: DateTime<Utc>) -> Observation {
        return Observation {
            address: self.address,
            mac_address: self.mac_address,
            hostname: self.hostname,
            healthcheck_status: self.healthcheck_status,
            observed_at: self.observed_at.unwrap_or(received_at),
        };
    }
}
