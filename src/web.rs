pub mod handlers;
pub mod schemas;

use std::convert::Infallible;
use std::sync::Arc;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use crate::ipam::Ipam;
use schemas::{IpListQuery, ListQuery, NextAvailableQuery, PurgeQuery};

fn with_ipam(ipam: Arc<Ipam>) -> impl Filter<Extract = (Arc<Ipam>,), Error = Infallible> + Clone {
    warp::any().map(move || ipam.clone())
}

fn subnet_filters(ipam: Arc<Ipam>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("subnets")
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::list_subnets);
    let create = warp::path!("subnets")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::create_subnet);
    let get = warp::path!("subnets" / u64)
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::get_subnet);
    let update = warp::path!("subnets" / u64)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::update_subnet);
    let delete = warp::path!("subnets" / u64)
        .and(warp::delete())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::delete_subnet);
    let next_available = warp::path!("subnets" / u64 / "next-available")
        .and(warp::get())
        .and(warp::query::<NextAvailableQuery>())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::next_available);
    let allocate = warp::path!("subnets" / u64 / "allocate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::allocate);
    let observe = warp::path!("subnets" / u64 / "observations")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::observe);
    let list_ranges = warp::path!("subnets" / u64 / "ranges")
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::list_ranges);
    let create_range = warp::path!("subnets" / u64 / "ranges")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam))
        .and_then(handlers::create_range);

    return list
        .or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(next_available)
        .unify()
        .or(allocate)
        .unify()
        .or(observe)
        .unify()
        .or(list_ranges)
        .unify()
        .or(create_range)
        .unify()
        .boxed();
}

fn range_filters(ipam: Arc<Ipam>) -> BoxedFilter<(Response,)> {
    let get = warp::path!("ranges" / u64)
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::get_range);
    let update = warp::path!("ranges" / u64)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::update_range);
    let delete = warp::path!("ranges" / u64)
        .and(warp::delete())
        .and(with_ipam(ipam))
        .and_then(handlers::delete_range);

    return get.or(update).unify().or(delete).unify().boxed();
}

fn ip_filters(ipam: Arc<Ipam>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("ips")
        .and(warp::get())
        .and(warp::query::<IpListQuery>())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::list_ips);
    let create = warp::path!("ips")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::create_ip);
    let get = warp::path!("ips" / u64)
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::get_ip);
    let update = warp::path!("ips" / u64)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::update_ip);
    let delete = warp::path!("ips" / u64)
        .and(warp::delete())
        .and(with_ipam(ipam))
        .and_then(handlers::delete_ip);

    return list
        .or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .boxed();
}

fn device_filters(ipam: Arc<Ipam>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("devices")
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::list_devices);
    let create = warp::path!("devices")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::create_device);
    let get = warp::path!("devices" / u64)
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::get_device);
    let update = warp::path!("devices" / u64)
        .and(warp::put())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::update_device);
    let delete = warp::path!("devices" / u64)
        .and(warp::delete())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::delete_device);
    let assign = warp::path!("devices" / u64 / "assign")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ipam(ipam))
        .and_then(handlers::assign);

    return list
        .or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(assign)
        .unify()
        .boxed();
}

fn misc_filters(ipam: Arc<Ipam>) -> BoxedFilter<(Response,)> {
    let health = warp::path!("health")
        .and(warp::get())
        .and_then(handlers::health);
    let stats = warp::path!("stats")
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::stats);
    let get_settings = warp::path!("settings")
        .and(warp::get())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::get_settings);
    let update_settings = warp::path!("settings")
        .and(warp::put())
        .and(warp::body::json())
        .and(with_ipam(ipam.clone()))
        .and_then(handlers::update_settings);
    let purge = warp::path!("settings" / "purge")
        .and(warp::post())
        .and(warp::query::<PurgeQuery>())
        .and(with_ipam(ipam))
        .and_then(handlers::purge);

    return health
        .or(stats)
        .unify()
        .or(get_settings)
        .unify()
        .or(update_settings)
        .unify()
        .or(purge)
        .unify()
        .boxed();
}

/// Every API route, with rejections rendered as `{"detail": ...}`.
pub fn filters(
    ipam: Arc<Ipam>,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    return subnet_filters(ipam.clone())
        .or(range_filters(ipam.clone()))
        .unify()
        .or(ip_filters(ipam.clone()))
        .unify()
        .or(device_filters(ipam.clone()))
        .unify()
        .or(misc_filters(ipam))
        .unify()
        .recover(handlers::rejection)
        .unify();
}
