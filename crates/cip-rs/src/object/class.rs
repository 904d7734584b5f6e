// crates/cip-rs/src/object/class.rs

use crate::CipError;
use crate::codec::TypedValue;
use crate::types::{AttributeFlags, ServiceCode};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// A single attribute of a class or instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CipAttribute {
    pub id: u16,
    pub name: &'static str,
    pub flags: AttributeFlags,
    pub value: TypedValue,
}

impl CipAttribute {
    pub fn new(id: u16, name: &'static str, flags: AttributeFlags, value: TypedValue) -> Self {
        Self {
            id,
            name,
            flags,
            value,
        }
    }
}

/// An object instance: an ordered set of attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CipInstance {
    pub id: u32,
    pub attributes: BTreeMap<u16, CipAttribute>,
}

impl CipInstance {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style helper used when populating predefined objects.
    pub fn with_attribute(mut self, attribute: CipAttribute) -> Self {
        self.attributes.insert(attribute.id, attribute);
        self
    }

    pub fn attribute(&self, id: u16) -> Option<&CipAttribute> {
        self.attributes.get(&id)
    }

    pub fn attribute_mut(&mut self, id: u16) -> Option<&mut CipAttribute> {
        self.attributes.get_mut(&id)
    }

    /// Concatenated encoding of every attribute flagged for GetAttributeAll.
    pub fn get_all_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for attribute in self.attributes.values() {
            if attribute.flags.contains(AttributeFlags::GET_ALL) {
                attribute.value.encode(&mut out);
            }
        }
        out
    }
}

/// A CIP class: its class-level attributes, instances and supported services.
///
/// Class attributes 1 (revision), 2 (max instance) and 3 (number of
/// instances) are kept current as instances are added and removed. They are
/// addressed as instance 0.
#[derive(Debug, Clone, PartialEq)]
pub struct CipClass {
    pub class_id: u32,
    pub name: &'static str,
    pub revision: u16,
    class_instance: CipInstance,
    instances: BTreeMap<u32, CipInstance>,
    services: Vec<ServiceCode>,
}

impl CipClass {
    pub fn new(class_id: u32, name: &'static str, revision: u16, services: &[ServiceCode]) -> Self {
        let mut class = Self {
            class_id,
            name,
            revision,
            class_instance: CipInstance::new(0),
            instances: BTreeMap::new(),
            services: services.to_vec(),
        };
        class.refresh_class_attributes();
        class
    }

    pub fn supports(&self, service: ServiceCode) -> bool {
        self.services.contains(&service)
    }

    pub fn services(&self) -> &[ServiceCode] {
        &self.services
    }

    /// Adds an instance. Ids must be unique within the class and non-zero.
    pub fn add_instance(&mut self, instance: CipInstance) -> Result<(), CipError> {
        if instance.id == 0 || self.instances.contains_key(&instance.id) {
            return Err(CipError::InstanceAlreadyExists {
                class_id: self.class_id,
                instance_id: instance.id,
            });
        }
        self.instances.insert(instance.id, instance);
        self.refresh_class_attributes();
        Ok(())
    }

    pub fn remove_instance(&mut self, id: u32) -> Option<CipInstance> {
        let removed = self.instances.remove(&id);
        if removed.is_some() {
            self.refresh_class_attributes();
        }
        removed
    }

    /// Looks up an instance; id 0 addresses the class itself.
    pub fn instance(&self, id: u32) -> Option<&CipInstance> {
        if id == 0 {
            Some(&self.class_instance)
        } else {
            self.instances.get(&id)
        }
    }

    pub fn instance_mut(&mut self, id: u32) -> Option<&mut CipInstance> {
        if id == 0 {
            // Class attributes are derived and not writable through here.
            None
        } else {
            self.instances.get_mut(&id)
        }
    }

    pub fn instances(&self) -> impl Iterator<Item = &CipInstance> {
        self.instances.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn refresh_class_attributes(&mut self) {
        let max_instance = self.instances.keys().next_back().copied().unwrap_or(0);
        self.class_instance = CipInstance::new(0)
            .with_attribute(CipAttribute::new(
                1,
                "Revision",
                AttributeFlags::GET,
                TypedValue::Uint(self.revision),
            ))
            .with_attribute(CipAttribute::new(
                2,
                "MaxInstance",
                AttributeFlags::GET,
                TypedValue::Uint(max_instance as u16),
            ))
            .with_attribute(CipAttribute::new(
                3,
                "NumberOfInstances",
                AttributeFlags::GET,
                TypedValue::Uint(self.instances.len() as u16),
            ));
    }
}
