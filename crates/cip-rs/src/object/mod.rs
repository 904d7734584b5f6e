// crates/cip-rs/src/object/mod.rs

mod class;
pub mod predefined;

pub use class::{CipAttribute, CipClass, CipInstance};

use crate::CipError;
use crate::codec::TypedValue;
use crate::types::{AttributeFlags, CLASS_ASSEMBLY};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use log::trace;

/// Assembly attribute holding the data bytes.
pub const ASSEMBLY_ATTR_DATA: u16 = 3;
/// Assembly attribute holding the data size in bytes.
pub const ASSEMBLY_ATTR_SIZE: u16 = 4;

/// The device's object model: every registered class, keyed by class id.
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    classes: BTreeMap<u32, CipClass>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            classes: BTreeMap::new(),
        }
    }

    pub fn register_class(&mut self, class: CipClass) -> Result<(), CipError> {
        if self.classes.contains_key(&class.class_id) {
            return Err(CipError::ClassAlreadyRegistered(class.class_id));
        }
        trace!("[MR] Registered class {:#x} ({})", class.class_id, class.name);
        self.classes.insert(class.class_id, class);
        predefined::refresh_object_list(self);
        Ok(())
    }

    pub fn class(&self, class_id: u32) -> Option<&CipClass> {
        self.classes.get(&class_id)
    }

    pub fn class_mut(&mut self, class_id: u32) -> Option<&mut CipClass> {
        self.classes.get_mut(&class_id)
    }

    /// Ids of every registered class, ascending.
    pub fn class_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.classes.keys().copied()
    }

    pub fn instance(&self, class_id: u32, instance_id: u32) -> Result<&CipInstance, CipError> {
        self.class(class_id)
            .ok_or(CipError::ClassNotFound(class_id))?
            .instance(instance_id)
            .ok_or(CipError::InstanceNotFound {
                class_id,
                instance_id,
            })
    }

    fn instance_mut(&mut self, class_id: u32, instance_id: u32) -> Result<&mut CipInstance, CipError> {
        self.classes
            .get_mut(&class_id)
            .ok_or(CipError::ClassNotFound(class_id))?
            .instance_mut(instance_id)
            .ok_or(CipError::InstanceNotFound {
                class_id,
                instance_id,
            })
    }

    pub fn attribute(
        &self,
        class_id: u32,
        instance_id: u32,
        attribute_id: u16,
    ) -> Result<&CipAttribute, CipError> {
        self.instance(class_id, instance_id)?
            .attribute(attribute_id)
            .ok_or(CipError::AttributeNotFound {
                class_id,
                instance_id,
                attribute_id,
            })
    }

    pub fn read_attribute(
        &self,
        class_id: u32,
        instance_id: u32,
        attribute_id: u16,
    ) -> Result<&TypedValue, CipError> {
        self.attribute(class_id, instance_id, attribute_id)
            .map(|attribute| &attribute.value)
    }

    /// Replaces an attribute value. The new value must have the same
    /// encoding as the old one. Access flags are not checked here; that is
    /// the router's job.
    pub fn write_attribute(
        &mut self,
        class_id: u32,
        instance_id: u32,
        attribute_id: u16,
        value: TypedValue,
    ) -> Result<(), CipError> {
        let attribute = self
            .instance_mut(class_id, instance_id)?
            .attribute_mut(attribute_id)
            .ok_or(CipError::AttributeNotFound {
                class_id,
                instance_id,
                attribute_id,
            })?;
        if attribute.value.tag() != value.tag() {
            return Err(CipError::TypeMismatch);
        }
        attribute.value = value;
        Ok(())
    }

    /// Creates an assembly instance holding `data`. Its size is fixed from
    /// then on.
    pub fn create_assembly(&mut self, instance_id: u32, data: Vec<u8>) -> Result<(), CipError> {
        let class = self
            .classes
            .get_mut(&CLASS_ASSEMBLY)
            .ok_or(CipError::ClassNotFound(CLASS_ASSEMBLY))?;
        let size = u16::try_from(data.len())
            .map_err(|_| CipError::InvalidConfiguration("Assembly data exceeds 65535 bytes"))?;
        class.add_instance(
            CipInstance::new(instance_id)
                .with_attribute(CipAttribute::new(
                    ASSEMBLY_ATTR_DATA,
                    "Data",
                    AttributeFlags::SET_AND_GET,
                    TypedValue::ByteArray(data),
                ))
                .with_attribute(CipAttribute::new(
                    ASSEMBLY_ATTR_SIZE,
                    "Size",
                    AttributeFlags::GET,
                    TypedValue::Uint(size),
                )),
        )
    }

    pub fn assembly_data(&self, instance_id: u32) -> Option<&[u8]> {
        match self.read_attribute(CLASS_ASSEMBLY, instance_id, ASSEMBLY_ATTR_DATA) {
            Ok(TypedValue::ByteArray(data)) => Some(data.as_slice()),
            _ => None,
        }
    }

    /// Overwrites an assembly's data; `data` must match the assembly size.
    pub fn set_assembly_data(&mut self, instance_id: u32, data: &[u8]) -> Result<(), CipError> {
        let attribute = self
            .instance_mut(CLASS_ASSEMBLY, instance_id)?
            .attribute_mut(ASSEMBLY_ATTR_DATA)
            .ok_or(CipError::AttributeNotFound {
                class_id: CLASS_ASSEMBLY,
                instance_id,
                attribute_id: ASSEMBLY_ATTR_DATA,
            })?;
        match &mut attribute.value {
            TypedValue::ByteArray(current) if current.len() == data.len() => {
                current.copy_from_slice(data);
                Ok(())
            }
            _ => Err(CipError::TypeMismatch),
        }
    }
}
