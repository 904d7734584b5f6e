// crates/cip-rs/src/object/predefined.rs
//! The classes every device carries: Identity, Message Router, Assembly and
//! Connection Manager.

use super::{CipAttribute, CipClass, CipInstance, ObjectRegistry};
use crate::CipError;
use crate::codec::TypedValue;
use crate::connection::ConnectionStats;
use crate::device::DeviceConfig;
use crate::types::{
    AttributeFlags, CLASS_ASSEMBLY, CLASS_CONNECTION_MANAGER, CLASS_IDENTITY,
    CLASS_MESSAGE_ROUTER, CipRevision, ServiceCode,
};
use alloc::vec::Vec;
use log::error;

const IDENTITY_ATTR_VENDOR_ID: u16 = 1;
const IDENTITY_ATTR_DEVICE_TYPE: u16 = 2;
const IDENTITY_ATTR_PRODUCT_CODE: u16 = 3;
const IDENTITY_ATTR_REVISION: u16 = 4;
const IDENTITY_ATTR_STATUS: u16 = 5;
const IDENTITY_ATTR_SERIAL_NUMBER: u16 = 6;
const IDENTITY_ATTR_PRODUCT_NAME: u16 = 7;

const ROUTER_ATTR_OBJECT_LIST: u16 = 1;
const ROUTER_ATTR_MAX_CONNECTIONS: u16 = 2;

/// Identity status bit set once at least one connection is owned.
pub const IDENTITY_STATUS_OWNED: u16 = 1 << 0;
/// Identity status bit: the device has been configured.
pub const IDENTITY_STATUS_CONFIGURED: u16 = 1 << 2;

/// The identity fields an electronic key is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision: CipRevision,
}

/// Registers the predefined classes and their instances.
pub fn populate(registry: &mut ObjectRegistry, config: &DeviceConfig) -> Result<(), CipError> {
    registry.register_class(identity_class(config)?)?;
    registry.register_class(message_router_class(config)?)?;
    registry.register_class(CipClass::new(
        CLASS_ASSEMBLY,
        "Assembly",
        2,
        &[
            ServiceCode::GetAttributeSingle,
            ServiceCode::SetAttributeSingle,
        ],
    ))?;
    registry.register_class(connection_manager_class()?)?;
    Ok(())
}

fn identity_class(config: &DeviceConfig) -> Result<CipClass, CipError> {
    let mut class = CipClass::new(
        CLASS_IDENTITY,
        "Identity",
        1,
        &[ServiceCode::GetAttributeAll, ServiceCode::GetAttributeSingle],
    );
    class.add_instance(
        CipInstance::new(1)
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_VENDOR_ID,
                "VendorId",
                AttributeFlags::GET,
                TypedValue::Uint(config.vendor_id),
            ))
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_DEVICE_TYPE,
                "DeviceType",
                AttributeFlags::GET,
                TypedValue::Uint(config.device_type),
            ))
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_PRODUCT_CODE,
                "ProductCode",
                AttributeFlags::GET,
                TypedValue::Uint(config.product_code),
            ))
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_REVISION,
                "Revision",
                AttributeFlags::GET,
                TypedValue::Revision(config.revision),
            ))
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_STATUS,
                "Status",
                AttributeFlags::GET,
                TypedValue::Word(IDENTITY_STATUS_CONFIGURED),
            ))
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_SERIAL_NUMBER,
                "SerialNumber",
                AttributeFlags::GET,
                TypedValue::Udint(config.serial_number),
            ))
            .with_attribute(CipAttribute::new(
                IDENTITY_ATTR_PRODUCT_NAME,
                "ProductName",
                AttributeFlags::GET,
                TypedValue::ShortString(config.product_name.as_bytes().to_vec()),
            )),
    )?;
    Ok(class)
}

fn message_router_class(config: &DeviceConfig) -> Result<CipClass, CipError> {
    let mut class = CipClass::new(
        CLASS_MESSAGE_ROUTER,
        "Message Router",
        1,
        &[ServiceCode::GetAttributeAll, ServiceCode::GetAttributeSingle],
    );
    let max_connections = config.max_io_connections + config.max_explicit_connections;
    class.add_instance(
        CipInstance::new(1)
            .with_attribute(CipAttribute::new(
                ROUTER_ATTR_OBJECT_LIST,
                "ObjectList",
                AttributeFlags::GET,
                TypedValue::ByteArray(Vec::new()),
            ))
            .with_attribute(CipAttribute::new(
                ROUTER_ATTR_MAX_CONNECTIONS,
                "MaxConnections",
                AttributeFlags::GET,
                TypedValue::Uint(max_connections.min(u16::MAX as usize) as u16),
            )),
    )?;
    Ok(class)
}

const CONNECTION_MANAGER_COUNTERS: [&str; 8] = [
    "OpenRequests",
    "OpenFormatRejects",
    "OpenResourceRejects",
    "OpenOtherRejects",
    "CloseRequests",
    "CloseFormatRequests",
    "CloseOtherRequests",
    "ConnectionTimeouts",
];

fn connection_manager_class() -> Result<CipClass, CipError> {
    let mut class = CipClass::new(
        CLASS_CONNECTION_MANAGER,
        "Connection Manager",
        1,
        &[
            ServiceCode::GetAttributeAll,
            ServiceCode::GetAttributeSingle,
            ServiceCode::ForwardOpen,
            ServiceCode::LargeForwardOpen,
            ServiceCode::ForwardClose,
            ServiceCode::GetConnectionOwner,
            ServiceCode::UnconnectedSend,
        ],
    );
    let mut instance = CipInstance::new(1);
    for (i, name) in CONNECTION_MANAGER_COUNTERS.iter().enumerate() {
        instance = instance.with_attribute(CipAttribute::new(
            i as u16 + 1,
            *name,
            AttributeFlags::GET,
            TypedValue::Uint(0),
        ));
    }
    class.add_instance(instance)?;
    Ok(class)
}

/// Rewrites the Message Router object list: a UINT count followed by the
/// UINT id of every registered class.
pub fn refresh_object_list(registry: &mut ObjectRegistry) {
    let ids: Vec<u32> = registry.class_ids().collect();
    let mut list = Vec::with_capacity(2 + ids.len() * 2);
    list.extend_from_slice(&(ids.len() as u16).to_le_bytes());
    for id in ids {
        list.extend_from_slice(&(id as u16).to_le_bytes());
    }
    if let Some(attribute) = registry
        .class_mut(CLASS_MESSAGE_ROUTER)
        .and_then(|class| class.instance_mut(1))
        .and_then(|instance| instance.attribute_mut(ROUTER_ATTR_OBJECT_LIST))
    {
        attribute.value = TypedValue::ByteArray(list);
    }
}

/// Reads the identity an electronic key is matched against.
pub fn read_identity(registry: &ObjectRegistry) -> Result<DeviceIdentity, CipError> {
    let read_u16 = |attribute_id| match registry.read_attribute(CLASS_IDENTITY, 1, attribute_id)? {
        TypedValue::Uint(v) => Ok(*v),
        _ => Err(CipError::TypeMismatch),
    };
    let revision = match registry.read_attribute(CLASS_IDENTITY, 1, IDENTITY_ATTR_REVISION)? {
        TypedValue::Revision(r) => *r,
        _ => return Err(CipError::TypeMismatch),
    };
    Ok(DeviceIdentity {
        vendor_id: read_u16(IDENTITY_ATTR_VENDOR_ID)?,
        device_type: read_u16(IDENTITY_ATTR_DEVICE_TYPE)?,
        product_code: read_u16(IDENTITY_ATTR_PRODUCT_CODE)?,
        revision,
    })
}

/// Sets or clears the "owned" bit of the Identity status word.
pub fn set_owned(registry: &mut ObjectRegistry, owned: bool) {
    let Ok(TypedValue::Word(status)) = registry
        .read_attribute(CLASS_IDENTITY, 1, IDENTITY_ATTR_STATUS)
        .cloned()
    else {
        return;
    };
    let status = if owned {
        status | IDENTITY_STATUS_OWNED
    } else {
        status & !IDENTITY_STATUS_OWNED
    };
    if let Err(e) =
        registry.write_attribute(CLASS_IDENTITY, 1, IDENTITY_ATTR_STATUS, TypedValue::Word(status))
    {
        error!("[DEV] Failed to update Identity status: {:?}", e);
    }
}

/// Mirrors the Connection Manager counters into instance 1 attributes 1-8.
pub fn update_connection_manager_counters(registry: &mut ObjectRegistry, stats: &ConnectionStats) {
    let values = stats.as_array();
    for (i, value) in values.iter().enumerate() {
        let attribute_id = i as u16 + 1;
        if let Err(e) = registry.write_attribute(
            CLASS_CONNECTION_MANAGER,
            1,
            attribute_id,
            TypedValue::Uint(*value),
        ) {
            error!(
                "[CM] Failed to mirror counter {} into attribute {}: {:?}",
                CONNECTION_MANAGER_COUNTERS[i], attribute_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn populated() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        populate(&mut registry, &DeviceConfig::default()).unwrap();
        registry
    }

    #[test]
    fn test_identity_round_trip() {
        let registry = populated();
        let identity = read_identity(&registry).unwrap();
        let config = DeviceConfig::default();
        assert_eq!(identity.vendor_id, config.vendor_id);
        assert_eq!(identity.device_type, config.device_type);
        assert_eq!(identity.product_code, config.product_code);
        assert_eq!(identity.revision, config.revision);
    }

    #[test]
    fn test_object_list() {
        let registry = populated();
        let list = match registry.read_attribute(CLASS_MESSAGE_ROUTER, 1, ROUTER_ATTR_OBJECT_LIST) {
            Ok(TypedValue::ByteArray(list)) => list.clone(),
            other => panic!("unexpected object list {:?}", other),
        };
        // Four classes: 0x01, 0x02, 0x04, 0x06.
        assert_eq!(list, [4, 0, 1, 0, 2, 0, 4, 0, 6, 0]);
    }

    #[test]
    fn test_object_list_follows_later_registrations() {
        let mut registry = populated();
        registry
            .register_class(CipClass::new(0x64, "Vendor", 1, &[ServiceCode::GetAttributeSingle]))
            .unwrap();
        assert_eq!(
            registry.read_attribute(CLASS_MESSAGE_ROUTER, 1, ROUTER_ATTR_OBJECT_LIST),
            Ok(&TypedValue::ByteArray(vec![5, 0, 1, 0, 2, 0, 4, 0, 6, 0, 0x64, 0]))
        );
    }

    #[test]
    fn test_owned_bit() {
        let mut registry = populated();
        set_owned(&mut registry, true);
        assert_eq!(
            registry.read_attribute(CLASS_IDENTITY, 1, IDENTITY_ATTR_STATUS),
            Ok(&TypedValue::Word(IDENTITY_STATUS_CONFIGURED | IDENTITY_STATUS_OWNED))
        );
        set_owned(&mut registry, false);
        assert_eq!(
            registry.read_attribute(CLASS_IDENTITY, 1, IDENTITY_ATTR_STATUS),
            Ok(&TypedValue::Word(IDENTITY_STATUS_CONFIGURED))
        );
    }

    #[test]
    fn test_counters_are_mirrored() {
        let mut registry = populated();
        let stats = ConnectionStats {
            open_requests: 3,
            connection_timeouts: 1,
            ..Default::default()
        };
        update_connection_manager_counters(&mut registry, &stats);
        assert_eq!(
            registry.read_attribute(CLASS_CONNECTION_MANAGER, 1, 1),
            Ok(&TypedValue::Uint(3))
        );
        assert_eq!(
            registry.read_attribute(CLASS_CONNECTION_MANAGER, 1, 8),
            Ok(&TypedValue::Uint(1))
        );
    }
}
