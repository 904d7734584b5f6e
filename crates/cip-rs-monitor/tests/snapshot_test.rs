// crates/cip-rs-monitor/tests/snapshot_test.rs

use cip_rs::connection::{
    ConnectionPriority, ConnectionTriple, ConnectionType, ForwardOpenRequest,
    NetworkConnectionParams, TransportTrigger,
};
use cip_rs::{CipDevice, DeviceConfig, RequestContext};
use cip_rs_monitor::DiagnosticSnapshot;

fn device_with_connection() -> CipDevice {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut device = CipDevice::new(DeviceConfig {
        o_to_t_run_idle_header: false,
        ..Default::default()
    })
    .unwrap();
    device.create_assembly(150, vec![0; 2]).unwrap();
    device.create_assembly(100, vec![0; 2]).unwrap();

    let params = NetworkConnectionParams {
        size: 4,
        variable_size: false,
        priority: ConnectionPriority::Scheduled,
        connection_type: ConnectionType::PointToPoint,
        redundant_owner: false,
    };
    let request = ForwardOpenRequest {
        priority_time_tick: 0x0A,
        timeout_ticks: 0x0E,
        o_to_t_connection_id: 0,
        t_to_o_connection_id: 0,
        triple: ConnectionTriple {
            connection_serial: 0x77,
            vendor_id: 0x0A,
            originator_serial: 0xBEEF,
        },
        timeout_multiplier: 1,
        o_to_t_rpi_us: 20_000,
        o_to_t_params: params,
        t_to_o_rpi_us: 20_000,
        t_to_o_params: params,
        transport: TransportTrigger::from_byte(0x01),
        connection_path: vec![0x20, 0x04, 0x2C, 150, 0x2C, 100],
        large: false,
    };
    let response = device.route(
        &RequestContext::default(),
        0x54,
        &[0x20, 0x06, 0x24, 0x01],
        &request.to_bytes(),
    );
    assert!(response.is_success(), "{:?}", response);
    device
}

#[test]
fn test_snapshot_captures_connection_table() {
    let mut device = device_with_connection();
    let events = device.drain_events();
    let snapshot = DiagnosticSnapshot::capture(&device, &events);

    assert_eq!(snapshot.connections.len(), 1);
    let conn = &snapshot.connections[0];
    assert_eq!(conn.kind, "ExclusiveOwner");
    assert_eq!(conn.state, "Established");
    assert_eq!(conn.connection_serial, 0x77);
    assert_eq!(conn.inactivity_timeout_us, 160_000);
    assert_eq!(snapshot.events.len(), 1);
    assert_eq!(snapshot.counters.open_requests, 1);
}

#[test]
fn test_snapshot_serializes_to_json() {
    let device = device_with_connection();
    let snapshot = DiagnosticSnapshot::capture(&device, &[]);
    let json: serde_json::Value = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["product_name"], "cip-rs adapter");
    assert_eq!(json["revision"], "1.001");
    assert_eq!(json["connections"][0]["consumed_point"], 150);
    assert_eq!(json["counters"]["connection_timeouts"], 0);
    assert!(json["events"].as_array().unwrap().is_empty());
}
