// crates/cip-rs/tests/common/mod.rs
//! Shared harness for the integration tests: a device driven by a virtual
//! clock plus builders for Connection Manager requests.
#![allow(dead_code)]

use cip_rs::connection::{
    ConnectionPriority, ConnectionTriple, ConnectionType, ForwardCloseRequest, ForwardOpenRequest,
    ForwardOpenSuccess, NetworkConnectionParams, TransportTrigger,
};
use cip_rs::{CipDevice, DeviceAction, DeviceConfig, MessageRouterResponse, RequestContext};

pub const CONSUMED_POINT: u32 = 150;
pub const PRODUCED_POINT: u32 = 100;
pub const CONFIG_POINT: u32 = 151;

/// Path of the Connection Manager object, class 6 instance 1.
pub const CONNECTION_MANAGER_PATH: [u8; 4] = [0x20, 0x06, 0x24, 0x01];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A device with two 2-byte assemblies, no run/idle headers and a
/// 4-byte configuration assembly.
pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        o_to_t_run_idle_header: false,
        t_to_o_run_idle_header: false,
        ..Default::default()
    }
}

pub struct DeviceHarness {
    pub device: CipDevice,
    pub now_us: u64,
    pub sent: Vec<DeviceAction>,
    next_serial: u16,
}

impl DeviceHarness {
    pub fn new(config: DeviceConfig) -> Self {
        init_logging();
        let mut device = CipDevice::new(config).expect("valid configuration");
        device.create_assembly(CONSUMED_POINT, vec![0; 2]).unwrap();
        device.create_assembly(PRODUCED_POINT, vec![0x11, 0x22]).unwrap();
        device.create_assembly(CONFIG_POINT, vec![0; 4]).unwrap();
        Self {
            device,
            now_us: 0,
            sent: Vec::new(),
            next_serial: 1,
        }
    }

    pub fn next_triple(&mut self) -> ConnectionTriple {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);
        ConnectionTriple {
            connection_serial: serial,
            vendor_id: 0x0001,
            originator_serial: 0x1234_5678,
        }
    }

    pub fn forward_open(&mut self, request: &ForwardOpenRequest) -> MessageRouterResponse {
        let service = if request.large { 0x5B } else { 0x54 };
        self.device.route(
            &RequestContext::default(),
            service,
            &CONNECTION_MANAGER_PATH,
            &request.to_bytes(),
        )
    }

    /// Opens a connection and returns its reply, panicking on rejection.
    pub fn open_ok(&mut self, request: &ForwardOpenRequest) -> ForwardOpenSuccess {
        let response = self.forward_open(request);
        assert!(response.is_success(), "Forward Open rejected: {:?}", response);
        ForwardOpenSuccess::parse(&response.data).unwrap()
    }

    pub fn forward_close(&mut self, triple: ConnectionTriple) -> MessageRouterResponse {
        let request = ForwardCloseRequest {
            priority_time_tick: 0x0A,
            timeout_ticks: 0x0E,
            triple,
            connection_path: Vec::new(),
        };
        self.device.route(
            &RequestContext::default(),
            0x4E,
            &CONNECTION_MANAGER_PATH,
            &request.to_bytes(),
        )
    }

    /// Advances the virtual clock in `step_us` increments, collecting output.
    pub fn advance(&mut self, total_us: u64, step_us: u64) {
        let mut remaining = total_us;
        while remaining > 0 {
            let step = step_us.min(remaining);
            self.now_us += step;
            remaining -= step;
            let actions = self.device.tick(step);
            self.sent.extend(actions);
        }
    }
}

pub fn fixed_params(size: u16) -> NetworkConnectionParams {
    NetworkConnectionParams {
        size,
        variable_size: false,
        priority: ConnectionPriority::Scheduled,
        connection_type: ConnectionType::PointToPoint,
        redundant_owner: false,
    }
}

/// A class 1 cyclic exclusive-owner request on the harness assemblies.
pub fn exclusive_owner_request(triple: ConnectionTriple) -> ForwardOpenRequest {
    ForwardOpenRequest {
        priority_time_tick: 0x0A,
        timeout_ticks: 0x0E,
        o_to_t_connection_id: 0,
        t_to_o_connection_id: 0,
        triple,
        timeout_multiplier: 0,
        o_to_t_rpi_us: 10_000,
        o_to_t_params: fixed_params(4),
        t_to_o_rpi_us: 10_000,
        t_to_o_params: fixed_params(4),
        transport: TransportTrigger::from_byte(0x01),
        connection_path: vec![
            0x20,
            0x04,
            0x2C,
            CONSUMED_POINT as u8,
            0x2C,
            PRODUCED_POINT as u8,
        ],
        large: false,
    }
}

/// A heartbeat connection (input-only or listen-only) producing the harness output assembly.
pub fn heartbeat_request(triple: ConnectionTriple, heartbeat_point: u8) -> ForwardOpenRequest {
    ForwardOpenRequest {
        o_to_t_params: fixed_params(2),
        connection_path: vec![0x20, 0x04, 0x2C, heartbeat_point, 0x2C, PRODUCED_POINT as u8],
        ..exclusive_owner_request(triple)
    }
}
