use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::ipam::address::parse_address;
use crate::ipam::model::{DeviceId, DiscoverySettings, IpId, PoolId, SubnetId};
use crate::ipam::{Ipam, IpamError};
use crate::web::schemas::{
    AllocateBody, Assignment, Detail, DeviceCreate, DeviceUpdate, Health, IpCreate, IpListQuery,
    IpUpdate, ListQuery, Message, NextAvailable, NextAvailableQuery, ObservationBody, PoolCreate,
    PoolUpdate, PurgeQuery, SubnetCreate, SubnetUpdate, DEFAULT_LIMIT, DEFAULT_PURGE_DAYS,
};

pub fn status_for(err: &IpamError) -> StatusCode {
    match err {
        IpamError::InvalidAddress(_)
        | IpamError::InvalidPrefix(_)
        | IpamError::NetworkNotAligned { .. }
        | IpamError::RangeOutOfBounds { .. }
        | IpamError::AddressImmutable
        | IpamError::InvalidBinding(_)
        | IpamError::InvalidStatus(_)
        | IpamError::NoContainingSubnet(_) => StatusCode::BAD_REQUEST,
        IpamError::SubnetNotFound(_)
        | IpamError::PoolNotFound(_)
        | IpamError::IpNotFound(_)
        | IpamError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
        IpamError::RangeOverlap { .. }
        | IpamError::SubnetOverlap { .. }
        | IpamError::DuplicateAddress(_)
        | IpamError::AddressInUse(_)
        | IpamError::SubnetInUse(_)
        | IpamError::PoolExhausted => StatusCode::CONFLICT,
        IpamError::AllocationContention(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn detail(message: String, status: StatusCode) -> Response {
    return warp::reply::with_status(warp::reply::json(&Detail { detail: message }), status)
        .into_response();
}

pub fn error_reply(err: &IpamError) -> Response {
    let reply = detail(err.to_string(), status_for(err));
    if err.retryable() {
        return warp::reply::with_header(reply, "retry-after", "1").into_response();
    }
    return reply;
}

pub fn respond<T: Serialize>(result: Result<T, IpamError>) -> Result<Response, Infallible> {
    match result {
        Ok(body) => return Ok(warp::reply::json(&body).into_response()),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn health() -> Result<Response, Infallible> {
    return respond(Ok(Health { status: "healthy" }));
}

pub async fn stats(ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(Ok(ipam.overview().await));
}

// Subnets

pub async fn list_subnets(query: ListQuery, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    let (skip, limit) = query.window();
    return respond(ipam.subnets.list(skip, limit).await);
}

pub async fn create_subnet(body: SubnetCreate, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    match body.into_new() {
        Ok(new) => return respond(ipam.subnets.create(new).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn get_subnet(id: SubnetId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.subnets.get(id).await);
}

pub async fn update_subnet(
    id: SubnetId,
    body: SubnetUpdate,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    match body.into_changes() {
        Ok(changes) => return respond(ipam.subnets.update(id, changes).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn delete_subnet(id: SubnetId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.subnets.delete(id).await.map(|_| Message {
        message: "Subnet deleted".to_string(),
    }));
}

pub async fn next_available(
    id: SubnetId,
    query: NextAvailableQuery,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    let pool_id: Option<PoolId> = match query.pool_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse() {
            Ok(pool_id) => Some(pool_id),
            Err(_) => {
                return Ok(detail(
                    format!("Invalid pool_id: {:?}", raw),
                    StatusCode::BAD_REQUEST,
                ))
            }
        },
    };
    return respond(
        ipam.allocator
            .find_next(id, pool_id)
            .await
            .map(|address| NextAvailable { address: address }),
    );
}

pub async fn allocate(
    id: SubnetId,
    body: AllocateBody,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    return respond(ipam.allocator.allocate(body.into_request(id)).await);
}

pub async fn observe(
    id: SubnetId,
    body: Vec<ObservationBody>,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    let received_at = chrono::Utc::now();
    let observations = body
        .into_iter()
        .map(|observation| observation.into_observation(received_at))
        .collect();
    return respond(ipam.reconciler.observe_batch(id, observations).await);
}

// IP ranges

pub async fn list_ranges(id: SubnetId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.pools.list_by_subnet(id).await);
}

pub async fn create_range(
    id: SubnetId,
    body: PoolCreate,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    match body.into_new(id) {
        Ok(new) => return respond(ipam.pools.create(new).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn get_range(id: PoolId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.pools.get(id).await);
}

pub async fn update_range(
    id: PoolId,
    body: PoolUpdate,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    match body.into_changes() {
        Ok(changes) => return respond(ipam.pools.update(id, changes).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn delete_range(id: PoolId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.pools.delete(id).await.map(|_| Message {
        message: "IP range deleted".to_string(),
    }));
}

// IP addresses

pub async fn list_ips(query: IpListQuery, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    let records = ipam
        .ledger
        .list(
            query.subnet_id,
            query.skip.unwrap_or(0),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await;
    return respond(Ok(records));
}

pub async fn create_ip(body: IpCreate, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    match body.into_new() {
        Ok(new) => return respond(ipam.ledger.create(new).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn get_ip(id: IpId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.ledger.get(id).await);
}

pub async fn update_ip(id: IpId, body: IpUpdate, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    match body.into_changes() {
        Ok(changes) => return respond(ipam.ledger.update(id, changes).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn delete_ip(id: IpId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.ledger.delete(id).await.map(|_| Message {
        message: "IP address deleted".to_string(),
    }));
}

// Devices

pub async fn list_devices(query: ListQuery, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    let (skip, limit) = query.window();
    return respond(Ok(ipam.devices.list(skip, limit).await));
}

pub async fn create_device(body: DeviceCreate, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    match body.into_new() {
        Ok(new) => return respond(ipam.devices.create(new).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn get_device(id: DeviceId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.devices.get(id).await);
}

pub async fn update_device(
    id: DeviceId,
    body: DeviceUpdate,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    match body.into_changes() {
        Ok(changes) => return respond(ipam.devices.update(id, changes).await),
        Err(err) => return Ok(error_reply(&err)),
    }
}

pub async fn delete_device(id: DeviceId, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(ipam.devices.delete(id).await.map(|_| Message {
        message: "Device deleted".to_string(),
    }));
}

pub async fn assign(
    id: DeviceId,
    body: Assignment,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    match parse_address(&body.ip_address) {
        Ok(address) => {
            return respond(
                ipam.devices
                    .assign(id, address, body.interface_name)
                    .await,
            )
        }
        Err(err) => return Ok(error_reply(&err)),
    }
}

// Settings

pub async fn get_settings(ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    return respond(Ok(ipam.settings().await));
}

pub async fn update_settings(
    body: DiscoverySettings,
    ipam: Arc<Ipam>,
) -> Result<Response, Infallible> {
    return respond(Ok(ipam.update_settings(body).await));
}

pub async fn purge(query: PurgeQuery, ipam: Arc<Ipam>) -> Result<Response, Infallible> {
    let days = query.days.unwrap_or(DEFAULT_PURGE_DAYS);
    let count = ipam
        .reconciler
        .purge(chrono::Duration::days(days as i64))
        .await;
    return respond(Ok(Message {
        message: format!("Successfully purged {} old discovered IPs", count),
    }));
}

/// Turns warp rejections into the same `{detail}` body engine errors use.
pub async fn rejection(err: Rejection) -> Result<Response, Infallible> {
    if err.is_not_found() {
        return Ok(detail("Not Found".to_string(), StatusCode::NOT_FOUND));
    }
    if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(detail(body_err.to_string(), StatusCode::BAD_REQUEST));
    }
    if let Some(query_err) = err.find::<warp::reject::InvalidQuery>() {
        return Ok(detail(query_err.to_string(), StatusCode::BAD_REQUEST));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(detail(
            "Method Not Allowed".to_string(),
            StatusCode::METHOD_NOT_ALLOWED,
        ));
    }
    if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(detail(
            "Unsupported Media Type".to_string(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ));
    }
    return Ok(detail(
        format!("Unhandled rejection: {:?}", err),
        StatusCode::INTERNAL_SERVER_ERROR,
    ));
}
