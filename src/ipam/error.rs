use std::net::Ipv4Addr;

use thiserror::Error;

use crate::ipam::model::{DeviceId, IpId, IpStatus, PoolId, SubnetId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpamError {
    #[error("Invalid IPv4 address: {0:?}")]
    InvalidAddress(String),
    #[error("Invalid prefix length: {0}")]
    InvalidPrefix(u32),
    #[error("Network address {network} has host bits set for prefix /{prefix}")]
    NetworkNotAligned { network: Ipv4Addr, prefix: u8 },
    #[error("Range {start} - {end} is outside the usable range of the subnet")]
    RangeOutOfBounds { start: Ipv4Addr, end: Ipv4Addr },
    #[error("Range {start} - {end} overlaps range {other:?}")]
    RangeOverlap {
        start: Ipv4Addr,
        end: Ipv4Addr,
        other: String,
    },
    #[error("Subnet {network}/{prefix} overlaps subnet {other:?}")]
    SubnetOverlap {
        network: Ipv4Addr,
        prefix: u8,
        other: String,
    },
    #[error("Address {0} already exists in this subnet")]
    DuplicateAddress(Ipv4Addr),
    #[error("Address of an IP record cannot be changed")]
    AddressImmutable,
    #[error("A device can only be bound to an ALLOCATED or RESERVED address, not {0}")]
    InvalidBinding(IpStatus),
    #[error("Cannot allocate an address with status {0}")]
    InvalidStatus(IpStatus),
    #[error("Address {0} is already in use")]
    AddressInUse(Ipv4Addr),
    #[error("Subnet {0} still has allocated or reserved addresses")]
    SubnetInUse(SubnetId),
    #[error("No free addresses left")]
    PoolExhausted,
    #[error("Could not allocate an address after {0} attempts, try again")]
    AllocationContention(u32),
    #[error("Subnet not found")]
    SubnetNotFound(SubnetId),
    #[error("IP range not found")]
    PoolNotFound(PoolId),
    #[error("IP address not found")]
    IpNotFound(IpId),
    #[error("Device not found")]
    DeviceNotFound(DeviceId),
    #[error("No subnet contains address {0}")]
    NoContainingSubnet(Ipv4Addr),
}

impl IpamError {
    /// Whether the caller may succeed by re-issuing the same request.
    pub fn retryable(&self) -> bool {
        matches!(self, IpamError::AllocationContention(_))
    }
}
