use rusty_ipamd::config::AllocationConfig;
use rusty_ipamd::ipam::Ipam;
use rusty_ipamd::web;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;

#[macro_use]
extern crate slog;

fn ipam() -> Arc<Ipam> {
    let logger = slog::Logger::root(slog::Discard, o!());
    return Arc::new(Ipam::create(&AllocationConfig::default(), &logger));
}

fn body(res: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    return serde_json::from_slice(res.body()).unwrap();
}

async fn create_subnet(ipam: &Arc<Ipam>, network: &str, prefix: u32, gateway: Option<&str>) -> u64 {
    let filter = web::filters(ipam.clone());
    let res = warp::test::request()
        .method("POST")
        .path("/subnets")
        .json(&json!({
            "name": "lan",
            "network_address": network,
            "prefix_length": prefix,
            "gateway": gateway,
        }))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK, "{:?}", res.body());
    return body(&res)["id"].as_u64().unwrap();
}

#[tokio::test]
async fn health() {
    let filter = web::filters(ipam());
    let res = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(&res), json!({"status": "healthy"}));
}

#[tokio::test]
async fn subnet_reports_stats() {
    let ipam = ipam();
    let id = create_subnet(&ipam, "10.0.0.0", 29, Some("10.0.0.1")).await;
    let filter = web::filters(ipam);

    let res = warp::test::request()
        .path(&format!("/subnets/{}", id))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let subnet = body(&res);
    assert_eq!(subnet["network_address"], "10.0.0.0");
    assert_eq!(subnet["prefix_length"], 29);
    assert_eq!(
        subnet["stats"],
        json!({"total": 8, "usable": 6, "free": 5, "assigned": 0, "discovered": 0})
    );
}

#[tokio::test]
async fn misaligned_subnet_is_rejected() {
    let filter = web::filters(ipam());
    let res = warp::test::request()
        .method("POST")
        .path("/subnets")
        .json(&json!({"name": "bad", "network_address": "10.0.0.5", "prefix_length": 24}))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["detail"].as_str().unwrap().contains("host bits"));
}

#[tokio::test]
async fn next_available_skips_gateway() {
    let ipam = ipam();
    let id = create_subnet(&ipam, "192.168.1.0", 24, Some("192.168.1.1")).await;
    let filter = web::filters(ipam);

    let res = warp::test::request()
        .path(&format!("/subnets/{}/next-available?pool_id=", id))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(&res), json!({"address": "192.168.1.2"}));

    let res = warp::test::request()
        .path(&format!("/subnets/{}/next-available?pool_id=abc", id))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn allocate_until_exhausted() {
    let ipam = ipam();
    let id = create_subnet(&ipam, "10.1.0.0", 30, None).await;
    let filter = web::filters(ipam);
    let path = format!("/subnets/{}/allocate", id);

    for expected in &["10.1.0.1", "10.1.0.2"] {
        let res = warp::test::request()
            .method("POST")
            .path(&path)
            .json(&json!({"hostname": "web"}))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let record = body(&res);
        assert_eq!(record["address"], *expected);
        assert_eq!(record["status"], "ALLOCATED");
    }

    let res = warp::test::request()
        .method("POST")
        .path(&path)
        .json(&json!({}))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(body(&res), json!({"detail": "No free addresses left"}));
}

#[tokio::test]
async fn duplicate_address_conflicts() {
    let ipam = ipam();
    let id = create_subnet(&ipam, "10.2.0.0", 24, None).await;
    let filter = web::filters(ipam);
    let ip = json!({"address": "10.2.0.10", "status": "RESERVED", "subnet_id": id});

    let res = warp::test::request()
        .method("POST")
        .path("/ips")
        .json(&ip)
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = warp::test::request()
        .method("POST")
        .path("/ips")
        .json(&ip)
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(body(&res)["detail"].as_str().unwrap().contains("10.2.0.10"));
}

#[tokio::test]
async fn null_device_unassigns() {
    let ipam = ipam();
    let subnet_id = create_subnet(&ipam, "10.3.0.0", 24, None).await;
    let filter = web::filters(ipam);

    let res = warp::test::request()
        .method("POST")
        .path("/devices")
        .json(&json!({"hostname": "nas", "ip_address": "10.3.0.20"}))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let device = body(&res);
    assert_eq!(device["ip_addresses"][0]["address"], "10.3.0.20");
    let ip_id = device["ip_addresses"][0]["id"].as_u64().unwrap();

    let res = warp::test::request()
        .method("PUT")
        .path(&format!("/ips/{}", ip_id))
        .json(&json!({"device_id": null}))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let record = body(&res);
    assert_eq!(record["device_id"], Value::Null);
    assert_eq!(record["status"], "ALLOCATED");
    assert_eq!(record["subnet_id"], subnet_id);
}

#[tokio::test]
async fn assign_promotes_discovered() {
    let ipam = ipam();
    let subnet_id = create_subnet(&ipam, "10.4.0.0", 24, None).await;
    let filter = web::filters(ipam);

    let res = warp::test::request()
        .method("POST")
        .path(&format!("/subnets/{}/observations", subnet_id))
        .json(&json!([
            {"address": "10.4.0.50", "mac_address": "aa:bb:cc:dd:ee:ff"},
            {"address": "10.9.0.1"},
        ]))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(&res), json!({"created": 1, "refreshed": 0, "dropped": 1}));

    let res = warp::test::request()
        .method("POST")
        .path("/devices")
        .json(&json!({"hostname": "printer"}))
        .reply(&filter)
        .await;
    let device_id = body(&res)["id"].as_u64().unwrap();

    let res = warp::test::request()
        .method("POST")
        .path(&format!("/devices/{}/assign", device_id))
        .json(&json!({"ip_address": "10.4.0.50", "interface_name": "eth0"}))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let record = body(&res);
    assert_eq!(record["status"], "ALLOCATED");
    assert_eq!(record["device_id"], device_id);
    assert_eq!(record["mac_address"], "aa:bb:cc:dd:ee:ff");
}

#[tokio::test]
async fn purge_reports_count() {
    let filter = web::filters(ipam());
    let res = warp::test::request()
        .method("POST")
        .path("/settings/purge?days=7")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body(&res),
        json!({"message": "Successfully purged 0 old discovered IPs"})
    );
}

#[tokio::test]
async fn purge_with_huge_window_deletes_nothing() {
    let ipam = ipam();
    let subnet_id = create_subnet(&ipam, "10.5.0.0", 24, None).await;
    let filter = web::filters(ipam);

    let res = warp::test::request()
        .method("POST")
        .path(&format!("/subnets/{}/observations", subnet_id))
        .json(&json!([{"address": "10.5.0.9", "observed_at": "2001-01-01T00:00:00Z"}]))
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = warp::test::request()
        .method("POST")
        .path("/settings/purge?days=4000000000")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body(&res),
        json!({"message": "Successfully purged 0 old discovered IPs"})
    );

    let res = warp::test::request()
        .path(&format!("/ips?subnet_id={}", subnet_id))
        .reply(&filter)
        .await;
    assert_eq!(body(&res).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_resources_have_detail() {
    let filter = web::filters(ipam());

    let res = warp::test::request().path("/subnets/42").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(&res), json!({"detail": "Subnet not found"}));

    let res = warp::test::request().path("/nowhere").reply(&filter).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(&res), json!({"detail": "Not Found"}));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let filter = web::filters(ipam());
    let res = warp::test::request()
        .method("POST")
        .path("/subnets")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["detail"].is_string());
}
