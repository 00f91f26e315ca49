use serde_derive::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::ipam::error::IpamError;
use crate::ipam::ledger::{bind_device, NewIp};
use crate::ipam::model::{Device, DeviceId, IpAddress, IpStatus};
use crate::ipam::store::{State, Store};

pub struct NewDevice {
    pub hostname: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub device_type: Option<String>,
    pub tags: Option<String>,
    pub notes: Option<String>,
    // Assigned to the device as part of the create
    pub ip_address: Option<Ipv4Addr>,
}

#[derive(Default)]
pub struct DeviceChanges {
    pub hostname: Option<String>,
    pub manufacturer: Option<Option<String>>,
    pub model: Option<Option<String>>,
    pub device_type: Option<Option<String>>,
    pub tags: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub ip_address: Option<Ipv4Addr>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub ip_addresses: Vec<IpAddress>,
}

fn view(state: &State, device: &Device) -> DeviceView {
    let mut ips: Vec<IpAddress> = state
        .ips
        .values()
        .filter(|ip| ip.device_id == Some(device.id))
        .cloned()
        .collect();
    ips.sort_by_key(|ip| (ip.subnet_id, u32::from(ip.address)));
    return DeviceView {
        device: device.clone(),
        ip_addresses: ips,
    };
}

/// Create the row as ALLOCATED if the address is free, otherwise bind the
/// existing row (promoting it if DISCOVERED).
fn assign_locked(
    state: &mut State,
    device_id: DeviceId,
    address: Ipv4Addr,
    interface_name: Option<String>,
) -> Result<IpAddress, IpamError> {
    state.device(device_id)?;
    let subnet_id = state
        .subnet_containing(address)
        .map(|subnet| subnet.id)
        .ok_or(IpamError::NoContainingSubnet(address))?;
    match state.ip_id_at(subnet_id, address) {
        Some(id) => return bind_device(state, id, device_id, interface_name),
        None => {
            return state.insert_ip(NewIp {
                device_id: Some(device_id),
                interface_name: interface_name,
                ..NewIp::new(subnet_id, address, IpStatus::Allocated)
            })
        }
    }
}

pub struct Devices {
    store: Arc<Store>,
    logger: slog::Logger,
}

impl Devices {
    pub fn new(store: Arc<Store>, logger: &slog::Logger) -> Devices {
        return Devices {
            store: store,
            logger: logger.new(o!("module" => "devices")),
        };
    }

    /// A failed address assignment rolls back the device as well.
    pub async fn create(&self, new: NewDevice) -> Result<DeviceView, IpamError> {
        let mut state = self.store.write().await;
        let device = Device {
            id: state.next_device_id(),
            hostname: new.hostname,
            manufacturer: new.manufacturer,
            model: new.model,
            device_type: new.device_type,
            tags: new.tags,
            notes: new.notes,
        };
        state.devices.insert(device.id, device.clone());
        if let Some(address) = new.ip_address {
            if let Err(err) = assign_locked(&mut state, device.id, address, None) {
                state.devices.remove(&device.id);
                return Err(err);
            }
        }
        info!(self.logger, "Created device {}", device.hostname; "id" => device.id);
        return Ok(view(&state, &device));
    }

    pub async fn get(&self, id: DeviceId) -> Result<DeviceView, IpamError> {
        let state = self.store.read().await;
        let device = state.device(id)?;
        return Ok(view(&state, device));
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Vec<DeviceView> {
        let state = self.store.read().await;
        return state
            .devices
            .values()
            .skip(skip)
            .take(limit)
            .map(|device| view(&state, device))
            .collect();
    }

    pub async fn update(
        &self,
        id: DeviceId,
        changes: DeviceChanges,
    ) -> Result<DeviceView, IpamError> {
        let mut state = self.store.write().await;
        let current = state.device(id)?.clone();
        if let Some(address) = changes.ip_address {
            let already_bound = state
                .subnet_containing(address)
                .and_then(|subnet| state.ip_at(subnet.id, address))
                .map(|ip| ip.device_id == Some(id))
                .unwrap_or(false);
            if !already_bound {
                assign_locked(&mut state, id, address, None)?;
            }
        }

        let device = Device {
            id: id,
            hostname: changes.hostname.unwrap_or(current.hostname),
            manufacturer: changes.manufacturer.unwrap_or(current.manufacturer),
            model: changes.model.unwrap_or(current.model),
            device_type: changes.device_type.unwrap_or(current.device_type),
            tags: changes.tags.unwrap_or(current.tags),
            notes: changes.notes.unwrap_or(current.notes),
        };
        state.devices.insert(id, device.clone());
        debug!(self.logger, "Updated device {}", device.hostname);
        return Ok(view(&state, &device));
    }

    /// The device's IP records stay, unbound, with their status unchanged.
    pub async fn delete(&self, id: DeviceId) -> Result<Device, IpamError> {
        let mut state = self.store.write().await;
        let device = state.devices.remove(&id).ok_or(IpamError::DeviceNotFound(id))?;
        let mut unassigned = 0;
        for ip in state.ips.values_mut() {
            if ip.device_id == Some(id) {
                ip.device_id = None;
                unassigned += 1;
            }
        }
        info!(
            self.logger, "Deleted device {}", device.hostname;
            "unassigned_ips" => unassigned
        );
        return Ok(device);
    }

    pub async fn assign(
        &self,
        device_id: DeviceId,
        address: Ipv4Addr,
        interface_name: Option<String>,
    ) -> Result<IpAddress, IpamError> {
        let mut state = self.store.write().await;
        let record = assign_locked(&mut state, device_id, address, interface_name)?;
        info!(
            self.logger, "Assigned address to device";
            "address" => %record.address, "device" => device_id
        );
        return Ok(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipam::model::Subnet;

    async fn devices() -> (Arc<Store>, Devices) {
        let store = Arc::new(Store::new());
        {
            let mut state = store.write().await;
            let id = state.next_subnet_id();
            state.subnets.insert(
                id,
                Subnet {
                    id: id,
                    name: "lan".to_string(),
                    network_address: Ipv4Addr::new(172, 16, 0, 0),
                    prefix_length: 16,
                    gateway: None,
                    vlan_id: Some(10),
                    description: None,
                    tags: None,
                    last_scan: None,
                    scan_status: "Idle".to_string(),
                },
            );
        }
        let logger = slog::Logger::root(slog::Discard, o!());
        let devices = Devices::new(store.clone(), &logger);
        return (store, devices);
    }

    fn new_device(hostname: &str, ip_address: Option<Ipv4Addr>) -> NewDevice {
        return NewDevice {
            hostname: hostname.to_string(),
            manufacturer: Some("Dell".to_string()),
            model: None,
            device_type: Some("server".to_string()),
            tags: Some("prod,web".to_string()),
            notes: None,
            ip_address: ip_address,
        };
    }

    #[tokio::test]
    async fn assign_creates_or_promotes() {
        let (store, devices) = devices().await;
        let web = devices.create(new_device("web", None)).await.unwrap().device;

        let fresh = devices
            .assign(web.id, Ipv4Addr::new(172, 16, 1, 1), Some("eth0".to_string()))
            .await
            .unwrap();
        assert_eq!(fresh.status, IpStatus::Allocated);
        assert_eq!(fresh.device_id, Some(web.id));
        assert_eq!(fresh.interface_name.as_deref(), Some("eth0"));

        let discovered = store
            .write()
            .await
            .insert_ip(NewIp::new(1, Ipv4Addr::new(172, 16, 1, 2), IpStatus::Discovered))
            .unwrap();
        let promoted = devices
            .assign(web.id, Ipv4Addr::new(172, 16, 1, 2), None)
            .await
            .unwrap();
        assert_eq!(promoted.id, discovered.id);
        assert_eq!(promoted.status, IpStatus::Allocated);

        assert_eq!(
            devices
                .assign(web.id, Ipv4Addr::new(10, 0, 0, 1), None)
                .await,
            Err(IpamError::NoContainingSubnet(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(
            devices
                .assign(77, Ipv4Addr::new(172, 16, 1, 3), None)
                .await,
            Err(IpamError::DeviceNotFound(77))
        );

        let view = devices.get(web.id).await.unwrap();
        assert_eq!(view.ip_addresses.len(), 2);
    }

    #[tokio::test]
    async fn create_with_address_is_atomic() {
        let (store, devices) = devices().await;
        let db = devices
            .create(new_device("db", Some(Ipv4Addr::new(172, 16, 0, 10))))
            .await
            .unwrap();
        assert_eq!(db.ip_addresses.len(), 1);
        assert_eq!(db.ip_addresses[0].address, Ipv4Addr::new(172, 16, 0, 10));

        // Already held by db
        assert_eq!(
            devices
                .create(new_device("clash", Some(Ipv4Addr::new(172, 16, 0, 10))))
                .await,
            Err(IpamError::AddressInUse(Ipv4Addr::new(172, 16, 0, 10)))
        );
        assert_eq!(store.read().await.devices.len(), 1);
    }

    #[tokio::test]
    async fn update_links_new_address() {
        let (_, devices) = devices().await;
        let id = devices
            .create(new_device("app", Some(Ipv4Addr::new(172, 16, 0, 20))))
            .await
            .unwrap()
            .device
            .id;

        let same = DeviceChanges {
            ip_address: Some(Ipv4Addr::new(172, 16, 0, 20)),
            notes: Some(Some("rack 4".to_string())),
            ..DeviceChanges::default()
        };
        let view = devices.update(id, same).await.unwrap();
        assert_eq!(view.ip_addresses.len(), 1);
        assert_eq!(view.device.notes.as_deref(), Some("rack 4"));

        let another = DeviceChanges {
            ip_address: Some(Ipv4Addr::new(172, 16, 0, 21)),
            ..DeviceChanges::default()
        };
        let view = devices.update(id, another).await.unwrap();
        assert_eq!(view.ip_addresses.len(), 2);
        assert_eq!(view.device.hostname, "app");
    }

    #[tokio::test]
    async fn delete_unassigns_addresses() {
        let (store, devices) = devices().await;
        let id = devices
            .create(new_device("old", Some(Ipv4Addr::new(172, 16, 0, 30))))
            .await
            .unwrap()
            .device
            .id;

        devices.delete(id).await.unwrap();
        let state = store.read().await;
        let ip = state.ip_at(1, Ipv4Addr::new(172, 16, 0, 30)).unwrap();
        assert_eq!(ip.device_id, None);
        assert_eq!(ip.status, IpStatus::Allocated);
        drop(state);
        assert_eq!(devices.get(id).await, Err(IpamError::DeviceNotFound(id)));
    }
}
