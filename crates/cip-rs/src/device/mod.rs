// crates/cip-rs/src/device/mod.rs
pub mod config;

pub use config::DeviceConfig;

use crate::CipError;
use crate::codec::ByteReader;
use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionStats, ConsumeOutcome, ExplicitLookup,
    ProducedPacket, UnconnectedSendRequest,
};
use crate::epath::{Segment, decode_segment, encode_path};
use crate::object::ObjectRegistry;
use crate::object::predefined;
use crate::router::{
    MessageRouterRequest, MessageRouterResponse, RequestContext, handle_common_service,
    resolve_target,
};
use crate::status::{ConnectionManagerStatus, GeneralStatus};
use crate::types::{CLASS_CONNECTION_MANAGER, ServiceCode};
use alloc::vec;
use alloc::vec::Vec;
use log::{debug, info, trace, warn};

/// What the transport should do after the device processed an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    /// Send an encoded Message Router reply to the requester.
    SendReply(Vec<u8>),
    /// Send an I/O packet on a T->O connection.
    SendIo {
        connection_id: u32,
        encap_sequence: u32,
        payload: Vec<u8>,
    },
    /// No immediate action is required.
    NoAction,
}

impl From<ProducedPacket> for DeviceAction {
    fn from(packet: ProducedPacket) -> Self {
        DeviceAction::SendIo {
            connection_id: packet.connection_id,
            encap_sequence: packet.encap_sequence,
            payload: packet.payload,
        }
    }
}

/// A complete CIP target device: the object model plus the Connection Manager.
///
/// The device is driven entirely by the transport. Requests and I/O packets
/// go in through the `handle_*` and `consume_io` methods, time goes in
/// through [`CipDevice::tick`], and everything that must be sent comes back
/// as [`DeviceAction`]s. All methods take `&mut self`; hosts that serve the
/// device from several threads wrap it in a single mutex.
#[derive(Debug)]
pub struct CipDevice {
    config: DeviceConfig,
    registry: ObjectRegistry,
    manager: ConnectionManager,
}

impl CipDevice {
    /// Creates a device with the predefined objects populated from `config`.
    /// Application assemblies are added afterwards with
    /// [`CipDevice::create_assembly`].
    pub fn new(config: DeviceConfig) -> Result<Self, CipError> {
        config.validate()?;
        let mut registry = ObjectRegistry::new();
        predefined::populate(&mut registry, &config)?;
        let manager = ConnectionManager::new(&config);
        info!(
            "[DEV] Created device '{}' (vendor {:#06x}, product {:#06x}, rev {})",
            config.product_name, config.vendor_id, config.product_code, config.revision
        );
        Ok(Self {
            config,
            registry,
            manager,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.manager.stats()
    }

    pub fn create_assembly(&mut self, instance_id: u32, data: Vec<u8>) -> Result<(), CipError> {
        self.registry.create_assembly(instance_id, data)
    }

    /// Processes an unconnected explicit request (encoded Message Router request).
    pub fn handle_unconnected(&mut self, ctx: &RequestContext, bytes: &[u8]) -> DeviceAction {
        let request = match MessageRouterRequest::parse(bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!("[DEV] Malformed request header: {}", e);
                // Only the path size word count can overrun once the service byte is read.
                return match bytes.first() {
                    Some(service) => DeviceAction::SendReply(
                        MessageRouterResponse::error(*service, GeneralStatus::PathSizeInvalid)
                            .to_bytes(),
                    ),
                    None => DeviceAction::NoAction,
                };
            }
        };
        let response = self.route(ctx, request.service, &request.path, &request.data);
        DeviceAction::SendReply(response.to_bytes())
    }

    /// Processes a connected explicit packet: `[sequence count][request]`.
    /// The reply is prefixed with the same sequence count.
    pub fn handle_connected(&mut self, ctx: &RequestContext, connection_id: u32, bytes: &[u8]) -> DeviceAction {
        let mut reader = ByteReader::new(bytes);
        let Ok(sequence) = reader.read_u16() else {
            debug!("[DEV] Connected packet on {:#010x} too short", connection_id);
            return DeviceAction::NoAction;
        };
        let reply = match self.manager.explicit_lookup(connection_id, sequence) {
            None => {
                trace!("[DEV] Explicit packet for unknown connection {:#010x}", connection_id);
                return DeviceAction::NoAction;
            }
            Some(ExplicitLookup::Cached(reply)) => reply,
            Some(ExplicitLookup::Route) => {
                let reply = match self.handle_unconnected(ctx, reader.rest()) {
                    DeviceAction::SendReply(reply) => reply,
                    _ => return DeviceAction::NoAction,
                };
                self.manager.store_explicit_reply(connection_id, sequence, reply.clone());
                reply
            }
        };
        let mut out = Vec::with_capacity(2 + reply.len());
        out.extend_from_slice(&sequence.to_le_bytes());
        out.extend_from_slice(&reply);
        DeviceAction::SendReply(out)
    }

    /// Routes one request to the addressed object.
    pub fn route(
        &mut self,
        ctx: &RequestContext,
        service: u8,
        path: &[u8],
        data: &[u8],
    ) -> MessageRouterResponse {
        let target = match resolve_target(&self.registry, service, path) {
            Ok(target) => target,
            Err(response) => return response,
        };
        if target.class_id != CLASS_CONNECTION_MANAGER {
            return handle_common_service(&mut self.registry, &target, data, &self.manager);
        }

        let response = match target.service {
            ServiceCode::ForwardOpen
            | ServiceCode::LargeForwardOpen
            | ServiceCode::ForwardClose
            | ServiceCode::GetConnectionOwner => {
                self.manager
                    .handle_service(&mut self.registry, ctx, target.service, data)
            }
            ServiceCode::UnconnectedSend => self.unconnected_send(ctx, data),
            _ => handle_common_service(&mut self.registry, &target, data, &self.manager),
        };
        predefined::update_connection_manager_counters(&mut self.registry, self.manager.stats());
        response
    }

    fn unconnected_send(&mut self, ctx: &RequestContext, data: &[u8]) -> MessageRouterResponse {
        let service = ServiceCode::UnconnectedSend as u8;
        let parameter_error = || {
            MessageRouterResponse::connection_failure(
                service,
                ConnectionManagerStatus::ParameterErrorInUnconnectedSendService,
                Vec::new(),
            )
        };

        let Ok(request) = UnconnectedSendRequest::parse(data) else {
            debug!("[MR] Malformed Unconnected Send");
            return parameter_error();
        };
        let Ok(mut embedded) = MessageRouterRequest::parse(&request.embedded_message) else {
            debug!("[MR] Malformed embedded message in Unconnected Send");
            return parameter_error();
        };
        if embedded.service == ServiceCode::UnconnectedSend as u8 {
            warn!("[MR] Rejecting nested Unconnected Send");
            return parameter_error();
        }

        // Routing errors carry the number of route path words left unprocessed.
        let route_len = request.route_path.len();
        let bad_route = |offset: usize| {
            let remaining_words = (route_len - offset).div_ceil(2).min(u8::MAX as usize);
            MessageRouterResponse::connection_failure(
                service,
                ConnectionManagerStatus::InvalidSegmentTypeInPath,
                vec![remaining_words as u8],
            )
        };
        let mut target_path = Vec::new();
        let mut offset = 0;
        while offset < route_len {
            let (segment, used) = match decode_segment(&request.route_path[offset..]) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!("[MR] Unconnected Send route path rejected at byte {}: {}", offset, e);
                    return bad_route(offset);
                }
            };
            match segment {
                Segment::Port(port)
                    if port.port == self.config.local_port
                        && port.link_address == [self.config.local_slot] => {}
                Segment::Logical(_) => target_path.push(segment),
                other => {
                    debug!("[MR] Cannot route Unconnected Send through {:?}", other);
                    return bad_route(offset);
                }
            }
            offset += used;
        }
        if !target_path.is_empty() {
            embedded.path = encode_path(&target_path);
        }

        trace!("[MR] Unconnected Send embedding service {:#04x}", embedded.service);
        self.route(ctx, embedded.service, &embedded.path, &embedded.data)
    }

    /// Processes a received O->T I/O packet.
    pub fn consume_io(&mut self, connection_id: u32, encap_sequence: u32, payload: &[u8]) -> ConsumeOutcome {
        self.manager
            .consume(&mut self.registry, connection_id, encap_sequence, payload)
    }

    /// Advances all connection timers by `elapsed_us` and returns the I/O
    /// packets that became due.
    pub fn tick(&mut self, elapsed_us: u64) -> Vec<DeviceAction> {
        let timeouts = self.manager.stats().connection_timeouts;
        let packets = self.manager.tick(&mut self.registry, elapsed_us);
        if self.manager.stats().connection_timeouts != timeouts {
            predefined::update_connection_manager_counters(&mut self.registry, self.manager.stats());
        }
        packets.into_iter().map(DeviceAction::from).collect()
    }

    /// Signals that the application changed assembly `point`.
    pub fn trigger_production(&mut self, point: u32) -> Vec<DeviceAction> {
        self.manager
            .trigger_production(&self.registry, point)
            .into_iter()
            .map(DeviceAction::from)
            .collect()
    }

    /// Closes all connections opened on an encapsulation session that ended.
    pub fn close_session(&mut self, session_handle: u32) -> usize {
        self.manager.close_session(&mut self.registry, session_handle)
    }

    pub fn close_connection(&mut self, connection_id: u32) -> Result<(), CipError> {
        self.manager.close_connection(&mut self.registry, connection_id)
    }

    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        self.manager.drain_events()
    }
}
