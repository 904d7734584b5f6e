// crates/cip-rs/src/connection/manager.rs

use super::conn::{CipConnection, ConnectionKind, ConnectionState, ConnectionTransition};
use super::events::{ConnectionEvent, ConsumeOutcome, ProducedPacket};
use super::forward_open::{
    ForwardCloseRequest, ForwardOpenRequest, ForwardOpenSuccess, GetConnectionOwnerReply,
    GetConnectionOwnerRequest, OwnerAction, failure_reply_data, forward_close_success_data,
};
use super::params::{ConnectionType, TransportClass, timeout_multiplier};
use crate::CipError;
use crate::codec::ByteReader;
use crate::device::DeviceConfig;
use crate::epath::{
    DataSegment, ElectronicKey, LogicalSegment, NetworkSegment, Segment, decode_segments,
};
use crate::object::ObjectRegistry;
use crate::object::predefined::{self, DeviceIdentity};
use crate::router::{AssemblyOwnership, MessageRouterResponse, RequestContext};
use crate::status::{ConnectionManagerStatus, GeneralStatus};
use crate::types::{CLASS_ASSEMBLY, CLASS_MESSAGE_ROUTER, IoConnectionEvent, ServiceCode};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use log::{debug, error, info, trace, warn};

const RUN_IDLE_HEADER_LEN: usize = 4;
const CIP_SEQUENCE_LEN: usize = 2;
const RUN_BIT: u32 = 1 << 0;

/// Connection Manager counters, mirrored into instance 1 attributes 1-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    pub open_requests: u16,
    pub open_format_rejects: u16,
    pub open_resource_rejects: u16,
    pub open_other_rejects: u16,
    pub close_requests: u16,
    pub close_format_requests: u16,
    pub close_other_requests: u16,
    pub connection_timeouts: u16,
}

impl ConnectionStats {
    pub fn as_array(&self) -> [u16; 8] {
        [
            self.open_requests,
            self.open_format_rejects,
            self.open_resource_rejects,
            self.open_other_rejects,
            self.close_requests,
            self.close_format_requests,
            self.close_other_requests,
            self.connection_timeouts,
        ]
    }
}

/// Classifies a rejection for the statistics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectKind {
    Format,
    Resource,
    Other,
}

fn reject_kind(status: ConnectionManagerStatus) -> RejectKind {
    use ConnectionManagerStatus::*;
    match status {
        TransportTriggerNotSupported | InvalidSegmentTypeInPath => RejectKind::Format,
        NoMoreConnectionsAvailable
        | OwnershipConflict
        | NonListenOnlyConnectionNotOpened
        | TargetObjectOutOfConnections => RejectKind::Resource,
        _ => RejectKind::Other,
    }
}

/// What a Forward Open's connection path asks for.
#[derive(Debug, Default)]
struct ConnectionPath {
    key: Option<ElectronicKey>,
    class_id: Option<u16>,
    points: Vec<u32>,
    production_inhibit_ms: Option<u8>,
    config_data: Option<Vec<u8>>,
}

/// Result of validating the application path of a Forward Open.
#[derive(Debug, Clone, Copy)]
struct ApplicationTarget {
    kind: ConnectionKind,
    config_instance: Option<u32>,
    consumed_point: u32,
    produced_point: u32,
}

/// Outcome of a connected explicit request lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplicitLookup {
    /// Same sequence count as the previous request: resend this reply.
    Cached(Vec<u8>),
    /// New request: route it and store the reply.
    Route,
}

/// Owns the connection table and implements the Connection Manager services.
#[derive(Debug)]
pub struct ConnectionManager {
    config: DeviceConfig,
    /// Open connections keyed by their O->T connection id.
    connections: BTreeMap<u32, CipConnection>,
    next_connection_id: u32,
    events: VecDeque<ConnectionEvent>,
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            config: config.clone(),
            connections: BTreeMap::new(),
            next_connection_id: config.connection_id_seed,
            events: VecDeque::new(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> impl Iterator<Item = &CipConnection> {
        self.connections.values()
    }

    /// Finds a connection by either of its ids.
    pub fn connection(&self, id: u32) -> Option<&CipConnection> {
        self.connections
            .get(&id)
            .or_else(|| self.connections.values().find(|c| c.uses_id(id)))
    }

    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        self.events.drain(..).collect()
    }

    /// Dispatches the connection-oriented Connection Manager services.
    pub fn handle_service(
        &mut self,
        registry: &mut ObjectRegistry,
        ctx: &RequestContext,
        service: ServiceCode,
        data: &[u8],
    ) -> MessageRouterResponse {
        match service {
            ServiceCode::ForwardOpen => self.forward_open(registry, ctx, data, false),
            ServiceCode::LargeForwardOpen => self.forward_open(registry, ctx, data, true),
            ServiceCode::ForwardClose => self.forward_close(registry, data),
            ServiceCode::GetConnectionOwner => self.get_connection_owner(data),
            _ => MessageRouterResponse::error(service as u8, GeneralStatus::ServiceNotSupported),
        }
    }

    // --- Forward Open ---

    pub fn forward_open(
        &mut self,
        registry: &mut ObjectRegistry,
        ctx: &RequestContext,
        data: &[u8],
        large: bool,
    ) -> MessageRouterResponse {
        let service = if large {
            ServiceCode::LargeForwardOpen as u8
        } else {
            ServiceCode::ForwardOpen as u8
        };
        self.stats.open_requests = self.stats.open_requests.wrapping_add(1);

        let request = match ForwardOpenRequest::parse(data, large) {
            Ok(request) => request,
            Err(e) => {
                warn!("[CM] Malformed Forward Open: {}", e);
                self.stats.open_format_rejects = self.stats.open_format_rejects.wrapping_add(1);
                return MessageRouterResponse::error(service, GeneralStatus::NotEnoughData);
            }
        };

        match self.open_connection(registry, ctx, &request) {
            Ok(reply) => MessageRouterResponse::success(service, reply.to_bytes()),
            Err(status) => {
                warn!(
                    "[CM] Forward Open rejected for serial {:#06x}: {}",
                    request.triple.connection_serial, status
                );
                let counter = match reject_kind(status) {
                    RejectKind::Format => &mut self.stats.open_format_rejects,
                    RejectKind::Resource => &mut self.stats.open_resource_rejects,
                    RejectKind::Other => &mut self.stats.open_other_rejects,
                };
                *counter = counter.wrapping_add(1);
                MessageRouterResponse::connection_failure(
                    service,
                    status,
                    failure_reply_data(&request.triple, 0),
                )
            }
        }
    }

    fn open_connection(
        &mut self,
        registry: &mut ObjectRegistry,
        ctx: &RequestContext,
        request: &ForwardOpenRequest,
    ) -> Result<ForwardOpenSuccess, ConnectionManagerStatus> {
        if self.connections.values().any(|c| c.triple == request.triple) {
            return Err(ConnectionManagerStatus::ConnectionInUse);
        }
        if !request.transport.is_supported() {
            return Err(ConnectionManagerStatus::TransportTriggerNotSupported);
        }

        let path = self.parse_connection_path(&request.connection_path)?;

        if let Some(key) = &path.key {
            let identity = predefined::read_identity(registry).map_err(|e| {
                error!("[CM] Identity object unreadable: {}", e);
                ConnectionManagerStatus::VendorIdOrProductCodeError
            })?;
            check_electronic_key(key, &identity)?;
        }

        if request.o_to_t_params.connection_type != ConnectionType::PointToPoint {
            return Err(ConnectionManagerStatus::InvalidOToTConnectionType);
        }
        let t_to_o_ok = match request.t_to_o_params.connection_type {
            ConnectionType::PointToPoint => true,
            ConnectionType::Multicast => request.transport.is_io(),
            _ => false,
        };
        if !t_to_o_ok {
            return Err(ConnectionManagerStatus::InvalidTToOConnectionType);
        }

        let target = self.resolve_application_path(registry, request, &path)?;

        if target.kind.is_io() {
            self.check_io_sizes(registry, request, &target)?;
            // Both timers are derived from the RPIs.
            if request.o_to_t_rpi_us == 0 || request.t_to_o_rpi_us == 0 {
                debug!(
                    "[CM] Zero RPI (O->T {} us, T->O {} us)",
                    request.o_to_t_rpi_us, request.t_to_o_rpi_us
                );
                return Err(ConnectionManagerStatus::RpiNotSupported);
            }
        }

        let inhibit_time_us = path.production_inhibit_ms.map_or(0, |ms| ms as u64 * 1000);
        if inhibit_time_us > request.t_to_o_rpi_us as u64 {
            return Err(ConnectionManagerStatus::PitGreaterThanRpi);
        }

        self.check_resources(&target)?;

        let o_to_t_connection_id = self.allocate_connection_id(&[]);
        let t_to_o_connection_id = self.allocate_connection_id(&[o_to_t_connection_id]);

        let multiplier = timeout_multiplier(request.timeout_multiplier);
        let inactivity_timeout_us = if target.kind.is_io() {
            request.o_to_t_rpi_us as u64 * multiplier as u64
        } else {
            self.config.explicit_inactivity_timeout_us
        };
        let heartbeat = matches!(target.kind, ConnectionKind::InputOnly | ConnectionKind::ListenOnly);

        let mut conn = CipConnection {
            state: ConnectionState::NonExistent,
            kind: target.kind,
            triple: request.triple,
            o_to_t_connection_id,
            t_to_o_connection_id,
            transport: request.transport,
            o_to_t_params: request.o_to_t_params,
            t_to_o_params: request.t_to_o_params,
            o_to_t_rpi_us: request.o_to_t_rpi_us as u64,
            t_to_o_rpi_us: request.t_to_o_rpi_us as u64,
            timeout_multiplier: multiplier,
            config_instance: target.config_instance,
            consumed_point: target.consumed_point,
            produced_point: target.produced_point,
            session_handle: ctx.session_handle,
            consumes_run_idle: target.kind.is_io() && !heartbeat && self.config.o_to_t_run_idle_header,
            produces_run_idle: target.kind.is_io() && self.config.t_to_o_run_idle_header,
            inactivity_timeout_us,
            watchdog_remaining_us: inactivity_timeout_us,
            production_remaining_us: request.t_to_o_rpi_us as u64,
            inhibit_time_us,
            inhibit_remaining_us: 0,
            production_pending: false,
            last_encap_sequence: None,
            last_cip_sequence: None,
            produced_cip_sequence: 0,
            produced_encap_sequence: 0,
            last_action: OwnerAction::None,
            last_explicit: None,
        };

        self.transition(&mut conn, ConnectionTransition::Configure);
        if let (Some(instance), Some(data)) = (target.config_instance, &path.config_data) {
            if let Err(e) = registry.set_assembly_data(instance, data) {
                warn!("[CM] Failed to apply configuration data to {}: {}", instance, e);
                self.transition(&mut conn, ConnectionTransition::ApplicationClose);
                return Err(ConnectionManagerStatus::InvalidConfigurationApplicationPath);
            }
        }
        self.transition(&mut conn, ConnectionTransition::Establish);

        info!(
            "[CM] Opened {:?} connection O->T {:#010x} T->O {:#010x} (consumed {}, produced {}, timeout {} us)",
            conn.kind,
            o_to_t_connection_id,
            t_to_o_connection_id,
            conn.consumed_point,
            conn.produced_point,
            inactivity_timeout_us
        );

        if conn.kind.is_io() {
            self.push_event(IoConnectionEvent::Opened, &conn);
        }
        let reply = ForwardOpenSuccess {
            o_to_t_connection_id,
            t_to_o_connection_id,
            triple: request.triple,
            o_to_t_api_us: request.o_to_t_rpi_us,
            t_to_o_api_us: request.t_to_o_rpi_us,
        };
        self.connections.insert(o_to_t_connection_id, conn);
        self.update_ownership(registry);
        Ok(reply)
    }

    fn parse_connection_path(&self, bytes: &[u8]) -> Result<ConnectionPath, ConnectionManagerStatus> {
        let (segments, unconsumed) = decode_segments(bytes).map_err(|e| {
            debug!("[CM] Connection path rejected: {}", e);
            ConnectionManagerStatus::InvalidSegmentTypeInPath
        })?;
        if unconsumed != 0 {
            return Err(ConnectionManagerStatus::InvalidSegmentTypeInPath);
        }

        let mut path = ConnectionPath::default();
        for segment in segments {
            match segment {
                Segment::Port(port) if self.is_local_port(port.port, &port.link_address) => {}
                Segment::Logical(LogicalSegment::ElectronicKey(key)) if path.key.is_none() => {
                    path.key = Some(key)
                }
                Segment::Logical(LogicalSegment::ClassId(id)) if path.class_id.is_none() => {
                    path.class_id = Some(id)
                }
                Segment::Logical(LogicalSegment::InstanceId(id))
                | Segment::Logical(LogicalSegment::ConnectionPoint(id)) => path.points.push(id),
                Segment::Logical(LogicalSegment::AttributeId(_)) => {}
                Segment::Network(NetworkSegment::ProductionInhibitTime(ms)) => {
                    path.production_inhibit_ms = Some(ms)
                }
                Segment::Network(NetworkSegment::Schedule(_))
                | Segment::Network(NetworkSegment::FixedTag(_))
                | Segment::Network(NetworkSegment::Extended(_)) => {}
                Segment::Data(DataSegment::Simple(data)) if path.config_data.is_none() => {
                    path.config_data = Some(data)
                }
                other => {
                    debug!("[CM] Unexpected segment in connection path: {:?}", other);
                    return Err(ConnectionManagerStatus::InvalidSegmentTypeInPath);
                }
            }
        }
        Ok(path)
    }

    fn is_local_port(&self, port: u16, link_address: &[u8]) -> bool {
        port == self.config.local_port && link_address == [self.config.local_slot]
    }

    fn resolve_application_path(
        &self,
        registry: &ObjectRegistry,
        request: &ForwardOpenRequest,
        path: &ConnectionPath,
    ) -> Result<ApplicationTarget, ConnectionManagerStatus> {
        let class_id = path.class_id.map(u32::from);
        match (request.transport.class, class_id) {
            (TransportClass::Class3, Some(CLASS_MESSAGE_ROUTER)) => {
                if path.points.as_slice() != [1] || path.config_data.is_some() {
                    return Err(ConnectionManagerStatus::InconsistentApplicationPathCombo);
                }
                Ok(ApplicationTarget {
                    kind: ConnectionKind::Explicit,
                    config_instance: None,
                    consumed_point: 1,
                    produced_point: 1,
                })
            }
            (TransportClass::Class0 | TransportClass::Class1, Some(CLASS_ASSEMBLY)) => {
                let (config_instance, consumed_point, produced_point) = match path.points.as_slice() {
                    [config, consumed, produced] => (Some(*config), *consumed, *produced),
                    [consumed, produced] => (None, *consumed, *produced),
                    [] => return Err(ConnectionManagerStatus::InvalidConsumingApplicationPath),
                    [_] => return Err(ConnectionManagerStatus::InvalidProducingApplicationPath),
                    _ => return Err(ConnectionManagerStatus::InconsistentApplicationPathCombo),
                };

                match (config_instance, &path.config_data) {
                    (Some(instance), data) => {
                        let Some(assembly) = registry.assembly_data(instance) else {
                            return Err(ConnectionManagerStatus::InvalidConfigurationApplicationPath);
                        };
                        if data.as_ref().is_some_and(|d| d.len() != assembly.len()) {
                            return Err(ConnectionManagerStatus::InvalidConfigurationApplicationPath);
                        }
                    }
                    (None, Some(_)) => {
                        return Err(ConnectionManagerStatus::InvalidConfigurationApplicationPath);
                    }
                    (None, None) => {}
                }

                let kind = if consumed_point == self.config.input_only_heartbeat_point {
                    ConnectionKind::InputOnly
                } else if consumed_point == self.config.listen_only_heartbeat_point {
                    ConnectionKind::ListenOnly
                } else if registry.assembly_data(consumed_point).is_some() {
                    ConnectionKind::ExclusiveOwner
                } else {
                    return Err(ConnectionManagerStatus::InvalidConsumingApplicationPath);
                };
                if registry.assembly_data(produced_point).is_none() {
                    return Err(ConnectionManagerStatus::InvalidProducingApplicationPath);
                }
                Ok(ApplicationTarget {
                    kind,
                    config_instance,
                    consumed_point,
                    produced_point,
                })
            }
            _ => Err(ConnectionManagerStatus::InconsistentApplicationPathCombo),
        }
    }

    /// Expected on-the-wire sizes of both directions of an I/O connection.
    fn expected_io_sizes(
        &self,
        registry: &ObjectRegistry,
        class1: bool,
        target: &ApplicationTarget,
    ) -> (usize, usize) {
        let sequence = if class1 { CIP_SEQUENCE_LEN } else { 0 };
        let heartbeat = target.kind != ConnectionKind::ExclusiveOwner;
        let consumed = if heartbeat {
            0
        } else {
            registry.assembly_data(target.consumed_point).map_or(0, |d| d.len())
        };
        let produced = registry.assembly_data(target.produced_point).map_or(0, |d| d.len());
        let o_to_t_header = if self.config.o_to_t_run_idle_header && !heartbeat {
            RUN_IDLE_HEADER_LEN
        } else {
            0
        };
        let t_to_o_header = if self.config.t_to_o_run_idle_header {
            RUN_IDLE_HEADER_LEN
        } else {
            0
        };
        (
            consumed + sequence + o_to_t_header,
            produced + sequence + t_to_o_header,
        )
    }

    fn check_io_sizes(
        &self,
        registry: &ObjectRegistry,
        request: &ForwardOpenRequest,
        target: &ApplicationTarget,
    ) -> Result<(), ConnectionManagerStatus> {
        let class1 = request.transport.class == TransportClass::Class1;
        let (o_to_t, t_to_o) = self.expected_io_sizes(registry, class1, target);
        // A variable-size connection may ask for less than the full size.
        let fits = |requested: u16, variable: bool, expected: usize| {
            if variable {
                requested as usize <= expected
            } else {
                requested as usize == expected
            }
        };
        if !fits(request.o_to_t_params.size, request.o_to_t_params.variable_size, o_to_t) {
            debug!(
                "[CM] O->T size {} does not match expected {}",
                request.o_to_t_params.size, o_to_t
            );
            return Err(ConnectionManagerStatus::InvalidOToTConnectionSize);
        }
        if !fits(request.t_to_o_params.size, request.t_to_o_params.variable_size, t_to_o) {
            debug!(
                "[CM] T->O size {} does not match expected {}",
                request.t_to_o_params.size, t_to_o
            );
            return Err(ConnectionManagerStatus::InvalidTToOConnectionSize);
        }
        Ok(())
    }

    fn check_resources(&self, target: &ApplicationTarget) -> Result<(), ConnectionManagerStatus> {
        let (io, explicit) = self
            .connections
            .values()
            .fold((0, 0), |(io, ex), c| if c.kind.is_io() { (io + 1, ex) } else { (io, ex + 1) });
        let full = if target.kind.is_io() {
            io >= self.config.max_io_connections
        } else {
            explicit >= self.config.max_explicit_connections
        };
        if full {
            return Err(ConnectionManagerStatus::NoMoreConnectionsAvailable);
        }
        if !target.kind.is_io() {
            return Ok(());
        }

        if target.kind == ConnectionKind::ExclusiveOwner
            && self.connections.values().any(|c| {
                c.kind == ConnectionKind::ExclusiveOwner && c.consumed_point == target.consumed_point
            })
        {
            return Err(ConnectionManagerStatus::OwnershipConflict);
        }

        let on_point = self
            .connections
            .values()
            .filter(|c| c.kind.is_io() && c.produced_point == target.produced_point);
        if target.kind == ConnectionKind::ListenOnly
            && !on_point.clone().any(|c| c.kind != ConnectionKind::ListenOnly)
        {
            return Err(ConnectionManagerStatus::NonListenOnlyConnectionNotOpened);
        }
        if on_point.count() >= self.config.max_connections_per_point {
            return Err(ConnectionManagerStatus::TargetObjectOutOfConnections);
        }
        Ok(())
    }

    /// Returns the next id not used by any open connection in either
    /// direction, nor by `reserved`.
    fn allocate_connection_id(&mut self, reserved: &[u32]) -> u32 {
        loop {
            let id = self.next_connection_id;
            self.next_connection_id = self.next_connection_id.wrapping_add(1);
            if id != 0
                && !reserved.contains(&id)
                && !self.connections.values().any(|c| c.uses_id(id))
            {
                return id;
            }
        }
    }

    // --- Forward Close ---

    pub fn forward_close(&mut self, registry: &mut ObjectRegistry, data: &[u8]) -> MessageRouterResponse {
        let service = ServiceCode::ForwardClose as u8;
        self.stats.close_requests = self.stats.close_requests.wrapping_add(1);

        let request = match ForwardCloseRequest::parse(data) {
            Ok(request) => request,
            Err(e) => {
                warn!("[CM] Malformed Forward Close: {}", e);
                self.stats.close_format_requests = self.stats.close_format_requests.wrapping_add(1);
                return MessageRouterResponse::error(service, GeneralStatus::NotEnoughData);
            }
        };

        let found = self
            .connections
            .iter()
            .find(|(_, c)| c.triple == request.triple)
            .map(|(id, _)| *id);
        match found {
            Some(id) => {
                info!("[CM] Forward Close for connection {:#010x}", id);
                self.remove_connection(registry, id, ConnectionTransition::ForwardClose);
                MessageRouterResponse::success(service, forward_close_success_data(&request.triple))
            }
            None => {
                warn!(
                    "[CM] Forward Close for unknown connection serial {:#06x}",
                    request.triple.connection_serial
                );
                self.stats.close_other_requests = self.stats.close_other_requests.wrapping_add(1);
                MessageRouterResponse::connection_failure(
                    service,
                    ConnectionManagerStatus::ConnectionNotFoundAtTargetApplication,
                    failure_reply_data(&request.triple, 0),
                )
            }
        }
    }

    // --- Get Connection Owner ---

    pub fn get_connection_owner(&self, data: &[u8]) -> MessageRouterResponse {
        let service = ServiceCode::GetConnectionOwner as u8;
        let request = match GetConnectionOwnerRequest::parse(data) {
            Ok(request) => request,
            Err(_) => return MessageRouterResponse::error(service, GeneralStatus::NotEnoughData),
        };
        let points: Vec<u32> = match decode_segments(&request.connection_path) {
            Ok((segments, 0)) => segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Logical(LogicalSegment::InstanceId(id))
                    | Segment::Logical(LogicalSegment::ConnectionPoint(id)) => Some(*id),
                    _ => None,
                })
                .collect(),
            _ => return MessageRouterResponse::error(service, GeneralStatus::PathSegmentError),
        };

        let mut reply = GetConnectionOwnerReply::default();
        for conn in self.connections.values().filter(|c| {
            c.kind.is_io()
                && (points.contains(&c.consumed_point) || points.contains(&c.produced_point))
        }) {
            reply.connection_count = reply.connection_count.saturating_add(1);
            if conn.kind == ConnectionKind::ExclusiveOwner {
                reply.coo_connections = reply.coo_connections.saturating_add(1);
                reply.owner = conn.triple;
                reply.last_action = conn.last_action;
            }
        }
        MessageRouterResponse::success(service, reply.to_bytes())
    }

    // --- Closing ---

    /// Closes every connection opened on `session_handle`. Returns how many were closed.
    pub fn close_session(&mut self, registry: &mut ObjectRegistry, session_handle: u32) -> usize {
        let ids: Vec<u32> = self
            .connections
            .iter()
            .filter(|(_, c)| c.session_handle == Some(session_handle))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.remove_connection(registry, *id, ConnectionTransition::ApplicationClose);
        }
        if !ids.is_empty() {
            info!("[CM] Session {:#010x} closed, dropped {} connection(s)", session_handle, ids.len());
        }
        ids.len()
    }

    /// Closes one connection, addressed by either of its ids.
    pub fn close_connection(&mut self, registry: &mut ObjectRegistry, id: u32) -> Result<(), CipError> {
        let key = self
            .connection(id)
            .map(|c| c.o_to_t_connection_id)
            .ok_or(CipError::ConnectionNotFound(id))?;
        self.remove_connection(registry, key, ConnectionTransition::ApplicationClose);
        Ok(())
    }

    fn remove_connection(
        &mut self,
        registry: &mut ObjectRegistry,
        id: u32,
        transition: ConnectionTransition,
    ) {
        let Some(mut conn) = self.connections.remove(&id) else {
            error!("[CM] Tried to remove unknown connection {:#010x}", id);
            return;
        };
        self.transition(&mut conn, transition);
        if conn.kind.is_io() {
            let kind = if conn.state == ConnectionState::TimedOut {
                IoConnectionEvent::TimedOut
            } else {
                IoConnectionEvent::Closed
            };
            self.push_event(kind, &conn);
        }
        self.transition(&mut conn, ConnectionTransition::Release);

        // Listen-only connections cannot outlive the connections they listen to.
        if conn.kind.is_io() && conn.kind != ConnectionKind::ListenOnly {
            let producer_left = self.connections.values().any(|c| {
                c.produced_point == conn.produced_point
                    && c.kind.is_io()
                    && c.kind != ConnectionKind::ListenOnly
            });
            if !producer_left {
                let listeners: Vec<u32> = self
                    .connections
                    .iter()
                    .filter(|(_, c)| {
                        c.kind == ConnectionKind::ListenOnly && c.produced_point == conn.produced_point
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for listener in listeners {
                    info!("[CM] Closing listen-only connection {:#010x}", listener);
                    self.remove_connection(registry, listener, ConnectionTransition::ApplicationClose);
                }
            }
        }
        self.update_ownership(registry);
    }

    fn transition(&self, conn: &mut CipConnection, transition: ConnectionTransition) {
        if let Err(e) = conn.apply(transition) {
            error!("[CM] Connection {:#010x}: {}", conn.o_to_t_connection_id, e);
        }
    }

    fn push_event(&mut self, kind: IoConnectionEvent, conn: &CipConnection) {
        self.events.push_back(ConnectionEvent {
            kind,
            o_to_t_connection_id: conn.o_to_t_connection_id,
            t_to_o_connection_id: conn.t_to_o_connection_id,
            consumed_point: conn.consumed_point,
            produced_point: conn.produced_point,
        });
    }

    fn update_ownership(&self, registry: &mut ObjectRegistry) {
        let owned = self.connections.values().any(|c| c.kind.is_io());
        predefined::set_owned(registry, owned);
    }

    // --- I/O ---

    /// Processes a received O->T packet.
    pub fn consume(
        &mut self,
        registry: &mut ObjectRegistry,
        connection_id: u32,
        encap_sequence: u32,
        payload: &[u8],
    ) -> ConsumeOutcome {
        let Some(conn) = self.connections.get_mut(&connection_id) else {
            trace!("[CM] Dropping I/O for unknown connection {:#010x}", connection_id);
            return ConsumeOutcome::UnknownConnection;
        };
        if !conn.kind.is_io() || conn.state != ConnectionState::Established {
            return ConsumeOutcome::UnknownConnection;
        }

        if let Some(last) = conn.last_encap_sequence {
            if (encap_sequence.wrapping_sub(last) as i32) <= 0 {
                trace!(
                    "[CM] Stale sequence {} (last {}) on {:#010x}",
                    encap_sequence, last, connection_id
                );
                return ConsumeOutcome::Stale;
            }
        }
        if !conn.o_to_t_params.accepts_size(payload.len()) {
            debug!(
                "[CM] I/O size {} rejected on {:#010x} (connection size {})",
                payload.len(),
                connection_id,
                conn.o_to_t_params.size
            );
            return ConsumeOutcome::SizeMismatch;
        }

        let mut reader = ByteReader::new(payload);
        let cip_sequence = if conn.is_class1() {
            match reader.read_u16() {
                Ok(seq) => Some(seq),
                Err(_) => return ConsumeOutcome::SizeMismatch,
            }
        } else {
            None
        };
        let run = if conn.consumes_run_idle {
            match reader.read_u32() {
                Ok(header) => header & RUN_BIT != 0,
                Err(_) => return ConsumeOutcome::SizeMismatch,
            }
        } else {
            true
        };
        let data = reader.rest();

        conn.last_encap_sequence = Some(encap_sequence);
        conn.reset_watchdog();

        if conn.kind != ConnectionKind::ExclusiveOwner {
            return ConsumeOutcome::Refreshed;
        }
        conn.last_action = if run { OwnerAction::Run } else { OwnerAction::Idle };
        if cip_sequence.is_some() && cip_sequence == conn.last_cip_sequence {
            return ConsumeOutcome::Refreshed;
        }
        conn.last_cip_sequence = cip_sequence;
        if !run {
            return ConsumeOutcome::Idle;
        }

        let expected = registry.assembly_data(conn.consumed_point).map_or(0, |d| d.len());
        if data.len() != expected {
            // Short variable-size packets update a prefix of the assembly.
            let mut merged = registry
                .assembly_data(conn.consumed_point)
                .map(|d| d.to_vec())
                .unwrap_or_default();
            let n = data.len().min(merged.len());
            merged[..n].copy_from_slice(&data[..n]);
            return write_consumed(registry, conn.consumed_point, &merged);
        }
        write_consumed(registry, conn.consumed_point, data)
    }

    /// Advances all timers by `elapsed_us`. Connections whose watchdog expires
    /// are removed; packets that are due are returned.
    pub fn tick(&mut self, registry: &mut ObjectRegistry, elapsed_us: u64) -> Vec<ProducedPacket> {
        let expired: Vec<u32> = self
            .connections
            .iter_mut()
            .filter(|(_, c)| c.state == ConnectionState::Established)
            .filter_map(|(id, c)| c.advance_watchdog(elapsed_us).then_some(*id))
            .collect();
        for id in expired {
            info!("[WDT] Connection {:#010x} timed out", id);
            self.stats.connection_timeouts = self.stats.connection_timeouts.wrapping_add(1);
            self.remove_connection(registry, id, ConnectionTransition::WatchdogExpired);
        }

        let mut packets = Vec::new();
        for conn in self.connections.values_mut() {
            if conn.advance_production(elapsed_us) {
                packets.push(produce(registry, conn));
            }
        }
        packets
    }

    /// Signals that the data of assembly `point` changed. Change-of-state
    /// and application-triggered connections producing it send now, or on a
    /// later tick if still inhibited.
    pub fn trigger_production(&mut self, registry: &ObjectRegistry, point: u32) -> Vec<ProducedPacket> {
        let mut packets = Vec::new();
        for conn in self
            .connections
            .values_mut()
            .filter(|c| c.produced_point == point && c.state == ConnectionState::Established)
        {
            if conn.request_production() {
                packets.push(produce(registry, conn));
            }
        }
        packets
    }

    // --- Connected explicit messaging ---

    /// Checks a connected explicit request's sequence count. Returns `None`
    /// for unknown or non-explicit connections.
    pub fn explicit_lookup(&mut self, connection_id: u32, sequence: u16) -> Option<ExplicitLookup> {
        let conn = self.connections.get_mut(&connection_id)?;
        if conn.kind != ConnectionKind::Explicit || conn.state != ConnectionState::Established {
            return None;
        }
        match &conn.last_explicit {
            Some((last, reply)) if *last == sequence => {
                debug!("[CM] Repeated explicit sequence {} on {:#010x}", sequence, connection_id);
                Some(ExplicitLookup::Cached(reply.clone()))
            }
            _ => {
                conn.reset_watchdog();
                Some(ExplicitLookup::Route)
            }
        }
    }

    /// Stores the reply to a routed connected explicit request.
    pub fn store_explicit_reply(&mut self, connection_id: u32, sequence: u16, reply: Vec<u8>) {
        if let Some(conn) = self.connections.get_mut(&connection_id) {
            conn.last_explicit = Some((sequence, reply));
        }
    }
}

impl AssemblyOwnership for ConnectionManager {
    fn is_exclusively_owned(&self, assembly_instance: u32) -> bool {
        self.connections.values().any(|c| {
            c.kind == ConnectionKind::ExclusiveOwner && c.consumed_point == assembly_instance
        })
    }
}

fn write_consumed(registry: &mut ObjectRegistry, point: u32, data: &[u8]) -> ConsumeOutcome {
    match registry.set_assembly_data(point, data) {
        Ok(()) => ConsumeOutcome::Accepted,
        Err(e) => {
            error!("[CM] Failed to write consumed data to assembly {}: {}", point, e);
            ConsumeOutcome::SizeMismatch
        }
    }
}

/// Builds the next T->O packet of `conn` and reloads its timers.
fn produce(registry: &ObjectRegistry, conn: &mut CipConnection) -> ProducedPacket {
    let data = registry.assembly_data(conn.produced_point).unwrap_or(&[]);
    let mut payload = Vec::with_capacity(CIP_SEQUENCE_LEN + RUN_IDLE_HEADER_LEN + data.len());
    if conn.is_class1() {
        conn.produced_cip_sequence = conn.produced_cip_sequence.wrapping_add(1);
        payload.extend_from_slice(&conn.produced_cip_sequence.to_le_bytes());
    }
    if conn.produces_run_idle {
        payload.extend_from_slice(&RUN_BIT.to_le_bytes());
    }
    payload.extend_from_slice(data);
    conn.produced_encap_sequence = conn.produced_encap_sequence.wrapping_add(1);
    conn.mark_produced();
    trace!(
        "[CM] Producing {} bytes on {:#010x} (seq {})",
        payload.len(),
        conn.t_to_o_connection_id,
        conn.produced_encap_sequence
    );
    ProducedPacket {
        connection_id: conn.t_to_o_connection_id,
        encap_sequence: conn.produced_encap_sequence,
        payload,
    }
}

fn check_electronic_key(
    key: &ElectronicKey,
    identity: &DeviceIdentity,
) -> Result<(), ConnectionManagerStatus> {
    if (key.vendor_id != 0 && key.vendor_id != identity.vendor_id)
        || (key.product_code != 0 && key.product_code != identity.product_code)
    {
        return Err(ConnectionManagerStatus::VendorIdOrProductCodeError);
    }
    if key.device_type != 0 && key.device_type != identity.device_type {
        return Err(ConnectionManagerStatus::DeviceTypeError);
    }
    if key.major_revision != 0 {
        if key.major_revision != identity.revision.major {
            return Err(ConnectionManagerStatus::RevisionMismatch);
        }
        let minor_ok = if key.compatibility {
            key.minor_revision <= identity.revision.minor
        } else {
            key.minor_revision == 0 || key.minor_revision == identity.revision.minor
        };
        if !minor_ok {
            return Err(ConnectionManagerStatus::RevisionMismatch);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::forward_open::ConnectionTriple;
    use crate::connection::params::{ConnectionPriority, NetworkConnectionParams, TransportTrigger};
    use crate::types::CipRevision;
    use alloc::vec;

    const CONSUMED: u32 = 150;
    const PRODUCED: u32 = 100;
    const CONFIG: u32 = 151;

    fn setup(config: DeviceConfig) -> (ObjectRegistry, ConnectionManager) {
        let mut registry = ObjectRegistry::new();
        predefined::populate(&mut registry, &config).unwrap();
        registry.create_assembly(CONSUMED, vec![0; 2]).unwrap();
        registry.create_assembly(PRODUCED, vec![0xA1, 0xA2]).unwrap();
        registry.create_assembly(CONFIG, vec![0; 4]).unwrap();
        (registry, ConnectionManager::new(&config))
    }

    fn no_run_idle() -> DeviceConfig {
        DeviceConfig {
            o_to_t_run_idle_header: false,
            ..Default::default()
        }
    }

    fn params(size: u16, connection_type: ConnectionType) -> NetworkConnectionParams {
        NetworkConnectionParams {
            size,
            variable_size: false,
            priority: ConnectionPriority::Scheduled,
            connection_type,
            redundant_owner: false,
        }
    }

    fn io_request(serial: u16, path: Vec<u8>) -> ForwardOpenRequest {
        ForwardOpenRequest {
            priority_time_tick: 0x0A,
            timeout_ticks: 0x0E,
            o_to_t_connection_id: 0,
            t_to_o_connection_id: 0,
            triple: ConnectionTriple {
                connection_serial: serial,
                vendor_id: 0x1234,
                originator_serial: 0xCAFE,
            },
            timeout_multiplier: 0,
            o_to_t_rpi_us: 10_000,
            o_to_t_params: params(4, ConnectionType::PointToPoint),
            t_to_o_rpi_us: 10_000,
            t_to_o_params: params(4, ConnectionType::PointToPoint),
            transport: TransportTrigger::from_byte(0x01),
            connection_path: path,
            large: false,
        }
    }

    fn owner_path() -> Vec<u8> {
        vec![0x20, 0x04, 0x24, CONFIG as u8, 0x2C, CONSUMED as u8, 0x2C, PRODUCED as u8]
    }

    fn open(
        manager: &mut ConnectionManager,
        registry: &mut ObjectRegistry,
        request: &ForwardOpenRequest,
    ) -> MessageRouterResponse {
        manager.forward_open(registry, &RequestContext::default(), &request.to_bytes(), request.large)
    }

    #[test]
    fn test_open_exclusive_owner() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let response = open(&mut manager, &mut registry, &io_request(1, owner_path()));
        assert!(response.is_success(), "{:?}", response);
        let reply = ForwardOpenSuccess::parse(&response.data).unwrap();
        assert_ne!(reply.o_to_t_connection_id, reply.t_to_o_connection_id);

        let conn = manager.connection(reply.o_to_t_connection_id).unwrap();
        assert_eq!(conn.state, ConnectionState::Established);
        assert_eq!(conn.kind, ConnectionKind::ExclusiveOwner);
        assert_eq!(conn.inactivity_timeout_us, 40_000);
        assert_eq!(manager.drain_events()[0].kind, IoConnectionEvent::Opened);
        assert!(manager.is_exclusively_owned(CONSUMED));
    }

    #[test]
    fn test_duplicate_triple() {
        let (mut registry, mut manager) = setup(no_run_idle());
        open(&mut manager, &mut registry, &io_request(1, owner_path()));
        let response = open(&mut manager, &mut registry, &io_request(1, owner_path()));
        assert_eq!(response.extended_status(), Some(0x0100));
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn test_transport_and_path_errors() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let mut request = io_request(1, owner_path());
        request.transport = TransportTrigger::from_byte(0x02);
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0103));

        let request = io_request(2, vec![0x20, 0x04, 0xE0, 0x00]);
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0315));

        // Tag-based application paths are not supported.
        let request = io_request(3, vec![0x91, 0x02, b'i', b'o']);
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0315));
        assert_eq!(manager.stats().open_format_rejects, 3);
    }

    #[test]
    fn test_electronic_key_checks() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let config = DeviceConfig::default();
        let keyed = |key: ElectronicKey| {
            let mut path = Vec::new();
            Segment::Logical(LogicalSegment::ElectronicKey(key)).encode(&mut path);
            path.extend_from_slice(&owner_path());
            path
        };
        let exact = ElectronicKey {
            vendor_id: config.vendor_id,
            device_type: config.device_type,
            product_code: config.product_code,
            major_revision: config.revision.major,
            compatibility: false,
            minor_revision: config.revision.minor,
        };

        let wrong_vendor = ElectronicKey { vendor_id: 0x7777, ..exact };
        let response = open(&mut manager, &mut registry, &io_request(1, keyed(wrong_vendor)));
        assert_eq!(response.extended_status(), Some(0x0114));

        let wrong_type = ElectronicKey { device_type: 0x2B, ..exact };
        let response = open(&mut manager, &mut registry, &io_request(2, keyed(wrong_type)));
        assert_eq!(response.extended_status(), Some(0x0115));

        let newer_minor = ElectronicKey {
            minor_revision: config.revision.minor + 1,
            compatibility: true,
            ..exact
        };
        let response = open(&mut manager, &mut registry, &io_request(3, keyed(newer_minor)));
        assert_eq!(response.extended_status(), Some(0x0116));

        let wildcard = ElectronicKey::default();
        let response = open(&mut manager, &mut registry, &io_request(4, keyed(wildcard)));
        assert!(response.is_success());
    }

    #[test]
    fn test_key_compatibility_accepts_older_minor() {
        let identity = DeviceIdentity {
            vendor_id: 1,
            device_type: 0x0C,
            product_code: 1,
            revision: CipRevision::new(2, 5),
        };
        let key = ElectronicKey {
            major_revision: 2,
            compatibility: true,
            minor_revision: 3,
            ..Default::default()
        };
        assert_eq!(check_electronic_key(&key, &identity), Ok(()));
        let strict = ElectronicKey {
            compatibility: false,
            ..key
        };
        assert_eq!(
            check_electronic_key(&strict, &identity),
            Err(ConnectionManagerStatus::RevisionMismatch)
        );
    }

    #[test]
    fn test_connection_types() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let mut request = io_request(1, owner_path());
        request.o_to_t_params = params(4, ConnectionType::Multicast);
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0123));

        let mut request = io_request(2, owner_path());
        request.t_to_o_params = params(4, ConnectionType::Null);
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0124));

        let mut request = io_request(3, owner_path());
        request.t_to_o_params = params(4, ConnectionType::Multicast);
        assert!(open(&mut manager, &mut registry, &request).is_success());
    }

    #[test]
    fn test_application_path_errors() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let cases: [(Vec<u8>, u16); 5] = [
            (vec![0x20, 0x01, 0x24, 0x01, 0x2C, 0x01], 0x012F),
            (vec![0x20, 0x04, 0x24, 0x09, 0x2C, CONSUMED as u8, 0x2C, PRODUCED as u8], 0x0129),
            (vec![0x20, 0x04, 0x2C, 0x09, 0x2C, PRODUCED as u8], 0x012A),
            (vec![0x20, 0x04, 0x2C, CONSUMED as u8, 0x2C, 0x09], 0x012B),
            (vec![0x20, 0x04, 0x2C, CONSUMED as u8], 0x012B),
        ];
        for (serial, (path, status)) in cases.into_iter().enumerate() {
            let response = open(&mut manager, &mut registry, &io_request(serial as u16, path));
            assert_eq!(response.extended_status(), Some(status));
        }
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn test_configuration_data() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let mut path = owner_path();
        path.extend_from_slice(&[0x80, 0x02, 1, 2, 3, 4]);
        assert!(open(&mut manager, &mut registry, &io_request(1, path)).is_success());
        assert_eq!(registry.assembly_data(CONFIG), Some(&[1u8, 2, 3, 4][..]));

        // Wrong configuration size.
        let mut path = vec![0x20, 0x04, 0x24, CONFIG as u8, 0x2C, 0xC6, 0x2C, PRODUCED as u8];
        path.extend_from_slice(&[0x80, 0x01, 1, 2]);
        let response = open(&mut manager, &mut registry, &io_request(2, path));
        assert_eq!(response.extended_status(), Some(0x0129));
    }

    #[test]
    fn test_size_checks() {
        let (mut registry, mut manager) = setup(DeviceConfig::default());
        // With the O->T run/idle header the expected O->T size is 2 + 2 + 4.
        let response = open(&mut manager, &mut registry, &io_request(1, owner_path()));
        assert_eq!(response.extended_status(), Some(0x0127));

        let mut request = io_request(2, owner_path());
        request.o_to_t_params = params(8, ConnectionType::PointToPoint);
        request.t_to_o_params = params(6, ConnectionType::PointToPoint);
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0128));

        let mut request = io_request(3, owner_path());
        request.o_to_t_params = params(8, ConnectionType::PointToPoint);
        request.t_to_o_params.variable_size = true;
        request.t_to_o_params.size = 3;
        assert!(open(&mut manager, &mut registry, &request).is_success());
    }

    #[test]
    fn test_production_inhibit_time() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let mut path = owner_path();
        path.extend_from_slice(&[0x43, 11]);
        let response = open(&mut manager, &mut registry, &io_request(1, path));
        assert_eq!(response.extended_status(), Some(0x011B));

        let mut path = owner_path();
        path.extend_from_slice(&[0x43, 10]);
        assert!(open(&mut manager, &mut registry, &io_request(2, path)).is_success());
    }

    #[test]
    fn test_zero_rpi_is_rejected() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let mut request = io_request(1, owner_path());
        request.o_to_t_rpi_us = 0;
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0111));

        let mut request = io_request(2, owner_path());
        request.t_to_o_rpi_us = 0;
        assert_eq!(open(&mut manager, &mut registry, &request).extended_status(), Some(0x0111));
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.stats().open_other_rejects, 2);

        // Explicit connections use the configured timeout, so their RPI is not checked.
        let mut request = io_request(3, vec![0x20, 0x02, 0x24, 0x01]);
        request.transport = TransportTrigger::from_byte(0xA3);
        request.o_to_t_rpi_us = 0;
        assert!(open(&mut manager, &mut registry, &request).is_success());
    }

    #[test]
    fn test_resource_checks() {
        let config = DeviceConfig {
            max_connections_per_point: 2,
            ..no_run_idle()
        };
        let (mut registry, mut manager) = setup(config);
        let listen_only = vec![0x20, 0x04, 0x2C, 199, 0x2C, PRODUCED as u8];
        let input_only = vec![0x20, 0x04, 0x2C, 198, 0x2C, PRODUCED as u8];
        let heartbeat = |serial, path| {
            let mut request = io_request(serial, path);
            request.o_to_t_params = params(2, ConnectionType::PointToPoint);
            request
        };

        // No connection to listen to yet.
        let response = open(&mut manager, &mut registry, &heartbeat(1, listen_only.clone()));
        assert_eq!(response.extended_status(), Some(0x0119));

        assert!(open(&mut manager, &mut registry, &io_request(2, owner_path())).is_success());
        let response = open(&mut manager, &mut registry, &io_request(3, owner_path()));
        assert_eq!(response.extended_status(), Some(0x0106));

        assert!(open(&mut manager, &mut registry, &heartbeat(4, listen_only.clone())).is_success());
        let response = open(&mut manager, &mut registry, &heartbeat(5, input_only));
        assert_eq!(response.extended_status(), Some(0x011A));
        assert_eq!(manager.stats().open_resource_rejects, 3);
    }

    #[test]
    fn test_table_full() {
        let config = DeviceConfig {
            max_io_connections: 1,
            ..no_run_idle()
        };
        let (mut registry, mut manager) = setup(config);
        assert!(open(&mut manager, &mut registry, &io_request(1, owner_path())).is_success());
        let mut request = io_request(2, vec![0x20, 0x04, 0x2C, 198, 0x2C, PRODUCED as u8]);
        request.o_to_t_params = params(2, ConnectionType::PointToPoint);
        let response = open(&mut manager, &mut registry, &request);
        assert_eq!(response.extended_status(), Some(0x0113));
    }

    #[test]
    fn test_forward_close() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let request = io_request(1, owner_path());
        open(&mut manager, &mut registry, &request);
        manager.drain_events();

        let close = ForwardCloseRequest {
            priority_time_tick: 0x0A,
            timeout_ticks: 0x0E,
            triple: request.triple,
            connection_path: owner_path(),
        };
        let response = manager.forward_close(&mut registry, &close.to_bytes());
        assert!(response.is_success());
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.drain_events()[0].kind, IoConnectionEvent::Closed);

        let response = manager.forward_close(&mut registry, &close.to_bytes());
        assert_eq!(response.extended_status(), Some(0x0107));
        assert!(manager.drain_events().is_empty());
    }

    #[test]
    fn test_listen_only_closed_with_owner() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let owner = io_request(1, owner_path());
        open(&mut manager, &mut registry, &owner);
        let mut listener = io_request(2, vec![0x20, 0x04, 0x2C, 199, 0x2C, PRODUCED as u8]);
        listener.o_to_t_params = params(2, ConnectionType::PointToPoint);
        assert!(open(&mut manager, &mut registry, &listener).is_success());
        manager.drain_events();

        let id = manager.connections().find(|c| c.triple == owner.triple).unwrap().o_to_t_connection_id;
        manager.close_connection(&mut registry, id).unwrap();
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.drain_events().len(), 2);
    }

    #[test]
    fn test_consume_sequence_rules() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let response = open(&mut manager, &mut registry, &io_request(1, owner_path()));
        let id = ForwardOpenSuccess::parse(&response.data).unwrap().o_to_t_connection_id;

        assert_eq!(manager.consume(&mut registry, id, 10, &[1, 0, 0xAA, 0xBB]), ConsumeOutcome::Accepted);
        assert_eq!(registry.assembly_data(CONSUMED), Some(&[0xAAu8, 0xBB][..]));

        // Same encapsulation sequence: stale.
        assert_eq!(manager.consume(&mut registry, id, 10, &[2, 0, 0xCC, 0xDD]), ConsumeOutcome::Stale);
        // Newer packet, same CIP sequence count: no data write.
        assert_eq!(manager.consume(&mut registry, id, 11, &[1, 0, 0xCC, 0xDD]), ConsumeOutcome::Refreshed);
        assert_eq!(registry.assembly_data(CONSUMED), Some(&[0xAAu8, 0xBB][..]));
        // Wrong size.
        assert_eq!(manager.consume(&mut registry, id, 12, &[2, 0, 0xCC]), ConsumeOutcome::SizeMismatch);
        // Sequence numbers wrap.
        assert_eq!(
            manager.consume(&mut registry, id, u32::MAX, &[3, 0, 0x01, 0x02]),
            ConsumeOutcome::Stale
        );
        assert_eq!(manager.consume(&mut registry, 999, 1, &[]), ConsumeOutcome::UnknownConnection);
    }

    #[test]
    fn test_consume_run_idle() {
        let (mut registry, mut manager) = setup(DeviceConfig::default());
        let mut request = io_request(1, owner_path());
        request.o_to_t_params = params(8, ConnectionType::PointToPoint);
        let response = open(&mut manager, &mut registry, &request);
        let id = ForwardOpenSuccess::parse(&response.data).unwrap().o_to_t_connection_id;

        let idle = [1, 0, 0, 0, 0, 0, 0x11, 0x22];
        assert_eq!(manager.consume(&mut registry, id, 1, &idle), ConsumeOutcome::Idle);
        assert_eq!(registry.assembly_data(CONSUMED), Some(&[0u8, 0][..]));

        let run = [2, 0, 1, 0, 0, 0, 0x11, 0x22];
        assert_eq!(manager.consume(&mut registry, id, 2, &run), ConsumeOutcome::Accepted);
        assert_eq!(registry.assembly_data(CONSUMED), Some(&[0x11u8, 0x22][..]));
    }

    #[test]
    fn test_cyclic_production_payload() {
        let (mut registry, mut manager) = setup(no_run_idle());
        open(&mut manager, &mut registry, &io_request(1, owner_path()));
        assert!(manager.tick(&mut registry, 5_000).is_empty());
        let packets = manager.tick(&mut registry, 5_000);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload, vec![1, 0, 0xA1, 0xA2]);
        assert_eq!(packets[0].encap_sequence, 1);
    }

    #[test]
    fn test_explicit_connection() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let mut request = io_request(1, vec![0x20, 0x02, 0x24, 0x01]);
        request.transport = TransportTrigger::from_byte(0xA3);
        request.o_to_t_params = params(500, ConnectionType::PointToPoint);
        request.t_to_o_params = params(500, ConnectionType::PointToPoint);
        let response = open(&mut manager, &mut registry, &request);
        assert!(response.is_success(), "{:?}", response);
        let id = ForwardOpenSuccess::parse(&response.data).unwrap().o_to_t_connection_id;
        assert!(manager.drain_events().is_empty());
        assert_eq!(
            manager.connection(id).unwrap().inactivity_timeout_us,
            DeviceConfig::default().explicit_inactivity_timeout_us
        );

        assert_eq!(manager.explicit_lookup(id, 1), Some(ExplicitLookup::Route));
        manager.store_explicit_reply(id, 1, vec![0x8E, 0, 0, 0]);
        assert_eq!(
            manager.explicit_lookup(id, 1),
            Some(ExplicitLookup::Cached(vec![0x8E, 0, 0, 0]))
        );
        assert_eq!(manager.explicit_lookup(id, 2), Some(ExplicitLookup::Route));
    }

    #[test]
    fn test_get_connection_owner() {
        let (mut registry, mut manager) = setup(no_run_idle());
        let request = io_request(1, owner_path());
        open(&mut manager, &mut registry, &request);
        let data = [0x00, 0x02, 0x20, 0x04, 0x24, CONSUMED as u8];
        let response = manager.get_connection_owner(&data);
        assert!(response.is_success());
        assert_eq!(response.data[0], 1);
        assert_eq!(response.data[1], 1);
        assert_eq!(&response.data[4..6], &request.triple.connection_serial.to_le_bytes());
        assert!(manager.is_exclusively_owned(CONSUMED));
        assert!(!manager.is_exclusively_owned(PRODUCED));
    }
}
