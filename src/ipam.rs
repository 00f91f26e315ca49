pub mod address;
pub mod allocator;
pub mod devices;
pub mod error;
pub mod ledger;
pub mod model;
pub mod pools;
pub mod reconciler;
pub mod store;
pub mod subnets;

use serde_derive::Serialize;
use std::sync::Arc;

use crate::config;
use allocator::Allocator;
use devices::Devices;
use ledger::Ledger;
use model::DiscoverySettings;
use pools::PoolRegistry;
use reconciler::Reconciler;
use store::Store;
use subnets::Subnets;

pub use error::IpamError;

const ONLINE: &str = "Online";

/// Dashboard counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub subnets: usize,
    pub devices: usize,
    pub total_ips: usize,
    pub online: usize,
}

/// The engine: every component sharing one store.
pub struct Ipam {
    pub subnets: Subnets,
    pub pools: PoolRegistry,
    pub ledger: Ledger,
    pub allocator: Allocator,
    pub reconciler: Reconciler,
    pub devices: Devices,
    store: Arc<Store>,
}

impl Ipam {
    pub fn create(config: &config::AllocationConfig, logger: &slog::Logger) -> Ipam {
        let store = Arc::new(Store::new());
        return Ipam {
            subnets: Subnets::new(store.clone(), logger),
            pools: PoolRegistry::new(store.clone(), logger),
            ledger: Ledger::new(store.clone(), logger),
            allocator: Allocator::new(store.clone(), config.max_attempts, logger),
            reconciler: Reconciler::new(store.clone(), logger),
            devices: Devices::new(store.clone(), logger),
            store: store,
        };
    }

    pub async fn overview(&self) -> Overview {
        let state = self.store.read().await;
        return Overview {
            subnets: state.subnets.len(),
            devices: state.devices.len(),
            total_ips: state.ips.len(),
            online: state
                .ips
                .values()
                .filter(|ip| ip.healthcheck_status.as_deref() == Some(ONLINE))
                .count(),
        };
    }

    pub async fn settings(&self) -> DiscoverySettings {
        return self.store.read().await.settings.clone();
    }

    pub async fn update_settings(&self, settings: DiscoverySettings) -> DiscoverySettings {
        let mut state = self.store.write().await;
        state.settings = settings;
        return state.settings.clone();
    }
}
