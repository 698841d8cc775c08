use std::sync::Arc;
use std::time::Duration;

use infinitude::{
    ActivityId, HoldInstruction, HoldUntil, InfinitudeClient, SetpointField, Temperature,
    UpdateCoordinator,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATUS_XML: &str = r#"<status version="1.7">
    <localTime>2024-03-02T14:35:00-05:00</localTime>
    <zones>
        <zone id="1">
            <name>Main Floor</name>
            <enabled>on</enabled>
            <currentActivity>home</currentActivity>
            <rt>70.5</rt>
            <rh>35</rh>
        </zone>
    </zones>
</status>"#;

fn config_body() -> serde_json::Value {
    serde_json::json!({
        "system": [{
            "version": "1.7",
            "config": [{
                "mode": ["heat"],
                "zones": [{
                    "zone": [{
                        "id": "1",
                        "name": ["Main Floor"],
                        "enabled": ["on"],
                        "holdActivity": ["home"],
                        "hold": ["off"],
                        "activities": [{
                            "activity": [
                                {"id": "home", "htsp": ["68.0"], "clsp": ["74.0"], "fan": ["auto"]},
                                {"id": "manual", "htsp": ["70.0"], "clsp": ["72.0"], "fan": ["auto"]}
                            ]
                        }],
                        "program": [{
                            "day": [
                                {"period": []}, {"period": []}, {"period": []}, {"period": []},
                                {"period": []}, {"period": []},
                                {"period": [{"time": ["17:30"], "enabled": ["on"], "activity": ["sleep"]}]}
                            ]
                        }]
                    }]
                }]
            }]
        }]
    })
}

async fn mount_reads(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/status.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STATUS_XML, "application/xml"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
        .mount(server)
        .await;
}

fn coordinator_for(server: &MockServer) -> UpdateCoordinator {
    UpdateCoordinator::new(InfinitudeClient::builder(server.uri()).build())
}

#[tokio::test]
async fn set_activity_posts_mutated_document() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""holdActivity":["away"]"#))
        .and(body_string_contains(r#""hold":["on"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let result = coordinator
        .set_activity("1", ActivityId::Away)
        .await
        .expect("write should run");
    assert!(result.accepted());
    assert_eq!(result.status, Some(200));
}

#[tokio::test]
async fn post_carries_untouched_fields_whole() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    // The untouched sibling activity and the version field must survive
    // the round trip; the device expects the complete document back.
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""version":"1.7""#))
        .and(body_string_contains(r#""id":"manual","htsp":["70.0"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let result = coordinator.set_activity("1", ActivityId::Home).await.unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn set_setpoint_converts_to_device_format() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""htsp":["72.0"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let result = coordinator
        .set_setpoint(
            "1",
            ActivityId::Manual,
            SetpointField::Heat,
            Temperature::from_celsius(22.0),
        )
        .await
        .unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn update_temperatures_sets_both_setpoints() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""htsp":["68.0"]"#))
        .and(body_string_contains(r#""clsp":["76.0"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let result = coordinator
        .update_temperatures(
            "1",
            ActivityId::Manual,
            Temperature::from_fahrenheit(68.0),
            Temperature::from_fahrenheit(76.0),
        )
        .await
        .unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn write_reuses_cached_snapshot_and_refreshes_eagerly() {
    let server = MockServer::start().await;
    // One GET for the initial read, a second for the eager refresh after
    // the accepted write. The write itself must not issue a third.
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = InfinitudeClient::builder(server.uri()).build();
    let coordinator = UpdateCoordinator::new(client.clone());

    assert!(client.get_config().await.is_some());
    let result = coordinator.set_activity("1", ActivityId::Home).await.unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn rejected_write_reports_status_and_keeps_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = InfinitudeClient::builder(server.uri()).build();
    let coordinator = UpdateCoordinator::new(client.clone());

    let result = coordinator.set_activity("1", ActivityId::Away).await.unwrap();
    assert!(!result.accepted());
    assert_eq!(result.status, Some(500));

    // No refresh happened and the cache still serves the pre-write
    // snapshot without another GET.
    let config = client.get_config().await.expect("cached config");
    assert_eq!(
        config.zone("1").unwrap().hold_activity,
        Some(ActivityId::Home)
    );
}

#[tokio::test]
async fn unreachable_device_reports_no_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = InfinitudeClient::builder(server.uri())
        .timeout(Duration::from_millis(50))
        .build();
    let coordinator = UpdateCoordinator::new(client);

    let result = coordinator.set_activity("1", ActivityId::Away).await.unwrap();
    assert!(!result.accepted());
    assert_eq!(result.status, None);
}

#[tokio::test]
async fn unknown_zone_fails_hard() {
    let server = MockServer::start().await;
    mount_reads(&server).await;

    let coordinator = coordinator_for(&server);
    let err = coordinator.set_activity("9", ActivityId::Home).await.unwrap_err();
    assert!(matches!(err, infinitude::Error::ZoneNotFound(_)));
}

#[tokio::test]
async fn unknown_activity_fails_hard_without_posting() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let err = coordinator
        .set_setpoint(
            "1",
            ActivityId::Sleep,
            SetpointField::Cool,
            Temperature::from_celsius(24.0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, infinitude::Error::ActivityNotFound { .. }));
}

#[tokio::test]
async fn no_snapshot_available_is_stale_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let err = coordinator.set_activity("1", ActivityId::Home).await.unwrap_err();
    assert!(matches!(err, infinitude::Error::StaleData));
}

#[tokio::test]
async fn mutating_a_returned_document_never_touches_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = InfinitudeClient::builder(server.uri()).build();
    let mut doc = client.get_config().await.expect("config");
    doc.zone_mut("1").unwrap().hold_activity = Some(ActivityId::Away);

    let again = client.get_config().await.expect("cached config");
    assert_eq!(
        again.zone("1").unwrap().hold_activity,
        Some(ActivityId::Home)
    );
}

#[tokio::test]
async fn set_hold_writes_expiry_time() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""otmr":["17:30"]"#))
        .and(body_string_contains(r#""holdActivity":["manual"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let hold = HoldInstruction {
        activity: ActivityId::Manual,
        until: HoldUntil::Until(chrono::NaiveTime::from_hms_opt(17, 30, 0).unwrap()),
    };
    let result = coordinator.set_hold("1", hold).await.unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn hold_until_next_transition_uses_the_program() {
    let server = MockServer::start().await;
    // Saturday 14:35; the only enabled period is Saturday 17:30.
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""otmr":["17:30"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let result = coordinator
        .hold_until_next_transition("1", ActivityId::Manual)
        .await
        .unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn release_hold_returns_control_to_the_program() {
    let server = MockServer::start().await;
    mount_reads(&server).await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .and(body_string_contains(r#""hold":["off"]"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let result = coordinator.release_hold("1").await.unwrap();
    assert!(result.accepted());
}

#[tokio::test]
async fn concurrent_writes_to_one_zone_both_complete() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systems.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/systems/infinitude"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(Duration::from_millis(50)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let coordinator = Arc::new(coordinator_for(&server));
    let a = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.set_activity("1", ActivityId::Away).await })
    };
    let b = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.set_activity("1", ActivityId::Sleep).await })
    };

    assert!(a.await.unwrap().unwrap().accepted());
    assert!(b.await.unwrap().unwrap().accepted());
}
