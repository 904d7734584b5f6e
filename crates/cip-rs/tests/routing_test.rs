// crates/cip-rs/tests/routing_test.rs

mod common;

use cip_rs::object::{CipAttribute, CipClass, CipInstance};
use cip_rs::{
    AttributeFlags, CipDevice, DeviceAction, GeneralStatus, MessageRouterRequest,
    MessageRouterResponse, RequestContext, ServiceCode, TypedValue,
};
use common::*;

const VENDOR_CLASS: u32 = 0x64;

fn device_with_vendor_class() -> CipDevice {
    init_logging();
    let mut device = CipDevice::new(test_config()).unwrap();
    device.create_assembly(1, vec![0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

    let mut class = CipClass::new(
        VENDOR_CLASS,
        "Vendor",
        1,
        &[
            ServiceCode::GetAttributeAll,
            ServiceCode::GetAttributeSingle,
            ServiceCode::SetAttributeSingle,
        ],
    );
    class
        .add_instance(
            CipInstance::new(1)
                .with_attribute(CipAttribute::new(1, "Counter", AttributeFlags::SET_AND_GET, TypedValue::Udint(7)))
                .with_attribute(CipAttribute::new(2, "Secret", AttributeFlags::SET_SINGLE, TypedValue::Uint(42)))
                .with_attribute(CipAttribute::new(3, "Label", AttributeFlags::GET, TypedValue::ShortString(b"io".to_vec()))),
        )
        .unwrap();
    device.registry_mut().register_class(class).unwrap();
    device
}

fn request(device: &mut CipDevice, service: u8, path: &[u8], data: &[u8]) -> MessageRouterResponse {
    let request = MessageRouterRequest::new(service, path.to_vec(), data.to_vec());
    match device.handle_unconnected(&RequestContext::default(), &request.to_bytes()) {
        DeviceAction::SendReply(bytes) => MessageRouterResponse::parse(&bytes).unwrap(),
        other => panic!("expected a reply, got {:?}", other),
    }
}

#[test]
fn test_assembly_path_routes_to_class_4_instance_1() {
    let mut device = device_with_vendor_class();
    let response = request(&mut device, 0x0E, &[0x20, 0x04, 0x24, 0x01, 0x30, 0x03], &[]);
    assert_eq!(response.general_status, GeneralStatus::Success);
    assert_eq!(response.reply_service, 0x8E);
    assert_eq!(response.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    let response = request(&mut device, 0x0E, &[0x20, 0x04, 0x24, 0x01, 0x30, 0x04], &[]);
    assert_eq!(response.data, 4u16.to_le_bytes().to_vec());
}

#[test]
fn test_attribute_without_get_single_is_not_gettable() {
    let mut device = device_with_vendor_class();
    let response = request(&mut device, 0x0E, &[0x20, 0x64, 0x24, 0x01, 0x30, 0x02], &[]);
    assert_eq!(response.general_status, GeneralStatus::AttributeNotGettable);
    assert!(response.data.is_empty());
}

#[test]
fn test_get_attribute_all_concatenates_in_id_order() {
    let mut device = device_with_vendor_class();
    let response = request(&mut device, 0x01, &[0x20, 0x64, 0x24, 0x01], &[]);
    assert!(response.is_success());
    // Attribute 2 is not part of GetAttributeAll.
    assert_eq!(response.data, vec![7, 0, 0, 0, 2, b'i', b'o']);
}

#[test]
fn test_set_attribute_single_checks_data_length() {
    let mut device = device_with_vendor_class();
    let path = [0x20, 0x64, 0x24, 0x01, 0x30, 0x01];
    assert_eq!(
        request(&mut device, 0x10, &path, &[1, 2]).general_status,
        GeneralStatus::NotEnoughData
    );
    assert_eq!(
        request(&mut device, 0x10, &path, &[1, 0, 0, 0, 0]).general_status,
        GeneralStatus::TooMuchData
    );
    assert!(request(&mut device, 0x10, &path, &[9, 0, 0, 0]).is_success());
    assert_eq!(request(&mut device, 0x0E, &path, &[]).data, vec![9, 0, 0, 0]);

    let read_only = [0x20, 0x64, 0x24, 0x01, 0x30, 0x03];
    assert_eq!(
        request(&mut device, 0x10, &read_only, &[0]).general_status,
        GeneralStatus::AttributeNotSetable
    );
}

#[test]
fn test_path_errors() {
    let mut device = device_with_vendor_class();
    let cases: [(&[u8], GeneralStatus); 5] = [
        (&[0x20, 0x77, 0x24, 0x01], GeneralStatus::PathDestinationUnknown),
        (&[0x20, 0x64, 0x24, 0x09], GeneralStatus::PathSegmentError),
        (&[0x24, 0x01], GeneralStatus::PathSegmentError),
        (&[0x20, 0x64, 0x25], GeneralStatus::PathSegmentError),
        (&[0xE0, 0x00], GeneralStatus::PathSegmentError),
    ];
    for (path, status) in cases {
        assert_eq!(request(&mut device, 0x0E, path, &[]).general_status, status, "path {:02x?}", path);
    }

    // The assembly class does not implement GetAttributeAll.
    let response = request(&mut device, 0x01, &[0x20, 0x04, 0x24, 0x01], &[]);
    assert_eq!(response.general_status, GeneralStatus::ServiceNotSupported);
}

#[test]
fn test_message_router_lists_classes_registered_later() {
    let mut device = device_with_vendor_class();
    let response = request(&mut device, 0x0E, &[0x20, 0x02, 0x24, 0x01, 0x30, 0x01], &[]);
    assert!(response.is_success());
    assert_eq!(response.data, vec![5, 0, 1, 0, 2, 0, 4, 0, 6, 0, 0x64, 0]);
}

#[test]
fn test_path_size_past_end_of_request() {
    let mut device = device_with_vendor_class();
    // Three path words announced, one present.
    for bytes in [&[0x0E, 0x03, 0x20, 0x01][..], &[0x0E][..]] {
        let DeviceAction::SendReply(reply) = device.handle_unconnected(&RequestContext::default(), bytes) else {
            panic!("expected a reply for {:02x?}", bytes);
        };
        let response = MessageRouterResponse::parse(&reply).unwrap();
        assert_eq!(response.reply_service, 0x8E);
        assert_eq!(response.general_status, GeneralStatus::PathSizeInvalid);
    }
}

#[test]
fn test_owned_assembly_rejects_explicit_writes() {
    let mut harness = DeviceHarness::new(test_config());
    let data_path = [0x20, 0x04, 0x24, CONSUMED_POINT as u8, 0x30, 0x03];
    let set = |harness: &mut DeviceHarness, data: &[u8]| {
        harness
            .device
            .route(&RequestContext::default(), 0x10, &data_path, data)
            .general_status
    };
    assert_eq!(set(&mut harness, &[1, 2]), GeneralStatus::Success);

    let triple = harness.next_triple();
    harness.open_ok(&exclusive_owner_request(triple));
    assert_eq!(set(&mut harness, &[3, 4]), GeneralStatus::DeviceStateConflict);
    assert_eq!(harness.device.registry().assembly_data(CONSUMED_POINT), Some(&[1u8, 2][..]));
}

#[test]
fn test_connection_manager_counters_are_readable() {
    let mut harness = DeviceHarness::new(test_config());
    let triple = harness.next_triple();
    harness.open_ok(&exclusive_owner_request(triple));
    harness.forward_open(&exclusive_owner_request(triple));

    let mut read = |attribute: u8| {
        let response = harness.device.route(
            &RequestContext::default(),
            0x0E,
            &[0x20, 0x06, 0x24, 0x01, 0x30, attribute],
            &[],
        );
        u16::from_le_bytes([response.data[0], response.data[1]])
    };
    assert_eq!(read(1), 2);
    assert_eq!(read(4), 1);
}
