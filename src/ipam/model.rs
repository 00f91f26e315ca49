use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::ipam::address::Block;
use crate::ipam::error::IpamError;

pub type SubnetId = u64;
pub type PoolId = u64;
pub type IpId = u64;
pub type DeviceId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpStatus {
    Allocated,
    Reserved,
    Discovered,
    DhcpPool,
}

impl IpStatus {
    /// Statuses owned by an operator rather than the scanner.
    pub fn authoritative(&self) -> bool {
        return matches!(self, IpStatus::Allocated | IpStatus::Reserved);
    }
}

impl std::fmt::Display for IpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            IpStatus::Allocated => write!(f, "ALLOCATED"),
            IpStatus::Reserved => write!(f, "RESERVED"),
            IpStatus::Discovered => write!(f, "DISCOVERED"),
            IpStatus::DhcpPool => write!(f, "DHCP_POOL"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolPurpose {
    Dhcp,
    Static,
    Reserved,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub name: String,
    pub network_address: Ipv4Addr,
    pub prefix_length: u8,
    pub gateway: Option<Ipv4Addr>,
    pub vlan_id: Option<u16>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub last_scan: Option<DateTime<Utc>>,
    pub scan_status: String,
}

impl Subnet {
    pub fn block(&self) -> Result<Block, IpamError> {
        return Block::new(self.network_address, self.prefix_length as u32);
    }
}

/// A named sub-range of a subnet. IPs are matched into a pool by containment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pool {
    pub id: PoolId,
    pub subnet_id: SubnetId,
    pub name: String,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
    pub purpose: PoolPurpose,
    pub description: Option<String>,
}

impl Pool {
    pub fn bounds(&self) -> (u32, u32) {
        return (u32::from(self.start_ip), u32::from(self.end_ip));
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let (start, end) = self.bounds();
        let addr = u32::from(addr);
        return start <= addr && addr <= end;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IpAddress {
    pub id: IpId,
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

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub hostname: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device_type: Option<String>,
    // Comma separated labels
    pub tags: Option<String>,
    pub notes: Option<String>,
}

/// Derived occupancy counters for a subnet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubnetStats {
    // Addresses in the CIDR block, network and broadcast included
    pub total: u64,
    pub usable: u64,
    pub free: u64,
    pub assigned: u64,
    pub discovered: u64,
}

/// Settings read by the external scanner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    // Minutes between discovery cycles
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval: u32,
    #[serde(default = "default_true")]
    pub arp_enabled: bool,
    #[serde(default = "default_true")]
    pub icmp_enabled: bool,
    #[serde(default)]
    pub dns_enabled: bool,
    #[serde(default)]
    pub dns_server: Option<String>,
    #[serde(default)]
    pub dns_search_domains: Option<String>,
}

fn default_discovery_interval() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        return DiscoverySettings {
            discovery_interval: default_discovery_interval(),
            arp_enabled: true,
            icmp_enabled: true,
            dns_enabled: false,
            dns_server: None,
            dns_search_domains: None,
        };
    }
}
