// crates/cip-rs/src/router.rs
//! Message Router request/response framing and the common services
//! (GetAttributeAll, GetAttributeSingle, SetAttributeSingle).

use crate::CipError;
use crate::codec::{ByteReader, TypedValue};
use crate::epath::{ResolvedPath, decode_path};
use crate::object::{ASSEMBLY_ATTR_DATA, ObjectRegistry};
use crate::status::{ConnectionManagerStatus, GeneralStatus};
use crate::types::{AttributeFlags, CLASS_ASSEMBLY, REPLY_SERVICE_MASK, ServiceCode};
use alloc::vec::Vec;
use log::{debug, trace};

/// Per-request information supplied by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Encapsulation session the request arrived on, if any.
    pub session_handle: Option<u32>,
}

/// A parsed explicit request: `[service][path size in words][path][data]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRouterRequest {
    pub service: u8,
    pub path: Vec<u8>,
    pub data: Vec<u8>,
}

impl MessageRouterRequest {
    pub fn new(service: u8, path: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            service,
            path,
            data,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(bytes);
        let service = reader.read_u8()?;
        let words = reader.read_u8()? as usize;
        let path = reader.take(words * 2)?.to_vec();
        let data = reader.rest().to_vec();
        Ok(Self {
            service,
            path,
            data,
        })
    }

    /// Serializes the request; an odd-length path is zero padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let words = self.path.len().div_ceil(2);
        let mut out = Vec::with_capacity(2 + words * 2 + self.data.len());
        out.push(self.service);
        out.push(words as u8);
        out.extend_from_slice(&self.path);
        if self.path.len() % 2 != 0 {
            out.push(0);
        }
        out.extend_from_slice(&self.data);
        out
    }
}

/// A Message Router reply:
/// `[service | 0x80][reserved][general status][additional status size][additional status words][data]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRouterResponse {
    pub reply_service: u8,
    pub general_status: GeneralStatus,
    pub additional_status: Vec<u16>,
    pub data: Vec<u8>,
}

impl MessageRouterResponse {
    pub fn success(service: u8, data: Vec<u8>) -> Self {
        Self {
            reply_service: service | REPLY_SERVICE_MASK,
            general_status: GeneralStatus::Success,
            additional_status: Vec::new(),
            data,
        }
    }

    pub fn error(service: u8, status: GeneralStatus) -> Self {
        Self {
            reply_service: service | REPLY_SERVICE_MASK,
            general_status: status,
            additional_status: Vec::new(),
            data: Vec::new(),
        }
    }

    /// A Connection Manager failure: general status plus the extended status word.
    pub fn connection_failure(service: u8, status: ConnectionManagerStatus, data: Vec<u8>) -> Self {
        Self {
            reply_service: service | REPLY_SERVICE_MASK,
            general_status: status.general_status(),
            additional_status: alloc::vec![status.code()],
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.general_status == GeneralStatus::Success
    }

    /// The extended status word, if one was returned.
    pub fn extended_status(&self) -> Option<u16> {
        self.additional_status.first().copied()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.additional_status.len() * 2 + self.data.len());
        out.push(self.reply_service);
        out.push(0);
        out.push(self.general_status as u8);
        out.push(self.additional_status.len() as u8);
        for word in &self.additional_status {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&self.data);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, CipError> {
        let mut reader = ByteReader::new(bytes);
        let reply_service = reader.read_u8()?;
        reader.skip(1)?;
        let general_status = GeneralStatus::try_from(reader.read_u8()?)?;
        let count = reader.read_u8()? as usize;
        let mut additional_status = Vec::with_capacity(count);
        for _ in 0..count {
            additional_status.push(reader.read_u16()?);
        }
        Ok(Self {
            reply_service,
            general_status,
            additional_status,
            data: reader.rest().to_vec(),
        })
    }
}

/// Lets the router ask whether an assembly is currently driven by an
/// exclusive-owner connection, in which case explicit writes are refused.
pub trait AssemblyOwnership {
    fn is_exclusively_owned(&self, assembly_instance: u32) -> bool;
}

/// The object a request addresses, after path resolution and the class
/// existence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedTarget {
    pub service: ServiceCode,
    pub class_id: u32,
    /// Instance 0 addresses the class itself.
    pub instance_id: u32,
    pub path: ResolvedPath,
}

/// Resolves a request path and checks that the addressed class, instance
/// and service exist. Failures are returned as finished responses.
pub fn resolve_target(
    registry: &ObjectRegistry,
    service: u8,
    path: &[u8],
) -> Result<RoutedTarget, MessageRouterResponse> {
    let resolved = decode_path(path).map_err(|e| {
        debug!("[MR] Path decode failed: {}", e);
        MessageRouterResponse::error(service, GeneralStatus::PathSegmentError)
    })?;
    if !resolved.is_complete() {
        debug!("[MR] Truncated request path ({} bytes left)", resolved.unconsumed);
        return Err(MessageRouterResponse::error(service, GeneralStatus::PathSegmentError));
    }
    let class_id = resolved
        .class_id
        .ok_or(MessageRouterResponse::error(service, GeneralStatus::PathSegmentError))?
        as u32;
    let class = registry.class(class_id).ok_or_else(|| {
        debug!("[MR] Unknown class {:#x}", class_id);
        MessageRouterResponse::error(service, GeneralStatus::PathDestinationUnknown)
    })?;
    let instance_id = resolved.target_instance().unwrap_or(0);
    if class.instance(instance_id).is_none() {
        debug!("[MR] Class {:#x} has no instance {}", class_id, instance_id);
        return Err(MessageRouterResponse::error(service, GeneralStatus::PathSegmentError));
    }
    let service_code = match ServiceCode::try_from(service) {
        Ok(code) if class.supports(code) => code,
        _ => {
            debug!("[MR] Service {:#04x} not supported by class {:#x}", service, class_id);
            return Err(MessageRouterResponse::error(service, GeneralStatus::ServiceNotSupported));
        }
    };
    Ok(RoutedTarget {
        service: service_code,
        class_id,
        instance_id,
        path: resolved,
    })
}

/// Executes GetAttributeAll, GetAttributeSingle or SetAttributeSingle.
pub fn handle_common_service(
    registry: &mut ObjectRegistry,
    target: &RoutedTarget,
    data: &[u8],
    ownership: &dyn AssemblyOwnership,
) -> MessageRouterResponse {
    let service = target.service as u8;
    let instance = match registry.instance(target.class_id, target.instance_id) {
        Ok(instance) => instance,
        Err(e) => return MessageRouterResponse::error(service, e.general_status()),
    };

    match target.service {
        ServiceCode::GetAttributeAll => {
            MessageRouterResponse::success(service, instance.get_all_bytes())
        }
        ServiceCode::GetAttributeSingle => {
            let Some(attribute) = target.path.attribute_id.and_then(|id| instance.attribute(id))
            else {
                return MessageRouterResponse::error(service, GeneralStatus::AttributeNotSupported);
            };
            if !attribute.flags.contains(AttributeFlags::GET_SINGLE) {
                return MessageRouterResponse::error(service, GeneralStatus::AttributeNotGettable);
            }
            trace!(
                "[MR] Get {:#x}/{}/{}",
                target.class_id, target.instance_id, attribute.id
            );
            MessageRouterResponse::success(service, attribute.value.to_bytes())
        }
        ServiceCode::SetAttributeSingle => {
            let Some(attribute) = target.path.attribute_id.and_then(|id| instance.attribute(id))
            else {
                return MessageRouterResponse::error(service, GeneralStatus::AttributeNotSupported);
            };
            if !attribute.flags.contains(AttributeFlags::SET_SINGLE) {
                return MessageRouterResponse::error(service, GeneralStatus::AttributeNotSetable);
            }
            let attribute_id = attribute.id;
            if target.class_id == CLASS_ASSEMBLY
                && attribute_id == ASSEMBLY_ATTR_DATA
                && ownership.is_exclusively_owned(target.instance_id)
            {
                return MessageRouterResponse::error(service, GeneralStatus::DeviceStateConflict);
            }
            let value = match TypedValue::decode(data, attribute.value.tag()) {
                Ok((value, used)) if used == data.len() => value,
                Ok(_) => return MessageRouterResponse::error(service, GeneralStatus::TooMuchData),
                Err(CipError::BufferUnderrun { .. }) | Err(CipError::InvalidEncoding) => {
                    return MessageRouterResponse::error(service, GeneralStatus::NotEnoughData);
                }
                Err(e) => return MessageRouterResponse::error(service, e.general_status()),
            };
            match registry.write_attribute(target.class_id, target.instance_id, attribute_id, value) {
                Ok(()) => MessageRouterResponse::success(service, Vec::new()),
                Err(e) => MessageRouterResponse::error(service, e.general_status()),
            }
        }
        _ => MessageRouterResponse::error(service, GeneralStatus::ServiceNotSupported),
    }
}
