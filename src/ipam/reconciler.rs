use chrono::{DateTime, Duration, Utc};
use serde_derive::Serialize;
use std::sync::Arc;

use crate::ipam::address::parse_address;
use crate::ipam::error::IpamError;
use crate::ipam::ledger::NewIp;
use crate::ipam::model::{IpAddress, IpStatus, SubnetId};
use crate::ipam::store::{State, Store};

/// One sighting reported by the scanner. The address is kept raw since the
/// scanner is not trusted to send well formed input.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub address: String,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub healthcheck_status: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Created(IpAddress),
    Refreshed(IpAddress),
    Dropped,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub refreshed: usize,
    pub dropped: usize,
}

fn refresh(record: &mut IpAddress, observation: Observation) {
    if observation.mac_address.is_some() {
        record.mac_address = observation.mac_address;
    }
    if observation.hostname.is_some() {
        record.hostname = observation.hostname;
    }
    if observation.healthcheck_status.is_some() {
        record.healthcheck_status = observation.healthcheck_status;
    }
    // A late report never moves last_seen backwards
    record.last_seen = match record.last_seen {
        Some(seen) if seen > observation.observed_at => Some(seen),
        _ => Some(observation.observed_at),
    };
}

fn observe_locked(
    state: &mut State,
    subnet_id: SubnetId,
    observation: Observation,
    logger: &slog::Logger,
) -> Result<Outcome, IpamError> {
    let (_, block) = state.subnet_block(subnet_id)?;
    let address = match parse_address(&observation.address) {
        Ok(address) => address,
        Err(err) => {
            warn!(logger, "Dropping observation: {}", err);
            return Ok(Outcome::Dropped);
        }
    };
    if !block.is_usable(address) {
        warn!(
            logger, "Dropping observation outside the subnet";
            "address" => %address, "block" => %block
        );
        return Ok(Outcome::Dropped);
    }

    match state.ip_id_at(subnet_id, address) {
        None => {
            let new = NewIp {
                mac_address: observation.mac_address,
                hostname: observation.hostname,
                healthcheck_status: observation.healthcheck_status,
                last_seen: Some(observation.observed_at),
                ..NewIp::new(subnet_id, address, IpStatus::Discovered)
            };
            let record = state.insert_ip(new)?;
            debug!(logger, "Discovered new address"; "address" => %address);
            return Ok(Outcome::Created(record));
        }
        Some(id) => {
            let record = state.ip_mut(id)?;
            // Metadata only: status and device_id belong to the operator
            refresh(record, observation);
            return Ok(Outcome::Refreshed(record.clone()));
        }
    }
}

/// Merges scanner observations into the ledger.
pub struct Reconciler {
    store: Arc<Store>,
    logger: slog::Logger,
}

impl Reconciler {
    pub fn new(store: Arc<Store>, logger: &slog::Logger) -> Reconciler {
        return Reconciler {
            store: store,
            logger: logger.new(o!("module" => "reconciler")),
        };
    }

    /// Returns the created or refreshed row, or `None` if the observation was
    /// dropped.
    pub async fn observe(
        &self,
        subnet_id: SubnetId,
        observation: Observation,
    ) -> Result<Option<IpAddress>, IpamError> {
        let mut state = self.store.write().await;
        match observe_locked(&mut state, subnet_id, observation, &self.logger)? {
            Outcome::Created(record) | Outcome::Refreshed(record) => return Ok(Some(record)),
            Outcome::Dropped => return Ok(None),
        }
    }

    /// Applies a scan result one address at a time and stamps the subnet's
    /// `last_scan`.
    pub async fn observe_batch(
        &self,
        subnet_id: SubnetId,
        observations: Vec<Observation>,
    ) -> Result<ReconcileSummary, IpamError> {
        let logger = self.logger.new(o!("routine" => "observe_batch", "subnet" => subnet_id));
        let mut summary = ReconcileSummary::default();
        self.store.read().await.subnet(subnet_id)?;

        for observation in observations {
            let mut state = self.store.write().await;
            match observe_locked(&mut state, subnet_id, observation, &logger)? {
                Outcome::Created(_) => summary.created += 1,
                Outcome::Refreshed(_) => summary.refreshed += 1,
                Outcome::Dropped => summary.dropped += 1,
            }
        }

        let mut state = self.store.write().await;
        if let Some(subnet) = state.subnets.get_mut(&subnet_id) {
            subnet.last_scan = Some(Utc::now());
        }
        info!(
            logger, "Reconciled scan";
            "created" => summary.created, "refreshed" => summary.refreshed,
            "dropped" => summary.dropped
        );
        return Ok(summary);
    }

    /// Deletes DISCOVERED rows not seen for `older_than`. Rows of any other
    /// status are kept regardless of age. A window reaching past the earliest
    /// representable time purges nothing.
    pub async fn purge(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now()
            .checked_sub_signed(older_than)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        return self.purge_before(cutoff).await;
    }

    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.store.write().await;
        let stale: Vec<_> = state
            .ips
            .values()
            .filter(|ip| ip.status == IpStatus::Discovered)
            .filter(|ip| ip.last_seen.map(|seen| seen < cutoff).unwrap_or(false))
            .map(|ip| ip.id)
            .collect();
        for id in stale.iter() {
            state.remove_ip(*id);
        }
        info!(self.logger, "Purged {} discovered addresses", stale.len(); "cutoff" => %cutoff);
        return stale.len();
    }
}
