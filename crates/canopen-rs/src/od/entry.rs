use alloc::vec::Vec;

/// Defines the access rights for an object.
/// (Reference: CiA 301, Table 41)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    /// read only access
    ReadOnly,
    /// write only access
    WriteOnly,
    /// read and write access
    #[default]
    ReadWrite,
    /// read only access, value is constant
    Constant,
}

impl AccessType {
    /// Whether an SDO upload of the object is allowed.
    pub fn is_readable(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    /// Whether an SDO download to the object is allowed.
    pub fn is_writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// One sub-object stored in the dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// A human-readable name for the object.
    pub name: &'static str,
    pub access: AccessType,
    /// Raw little-endian value.
    pub value: Vec<u8>,
    /// `true` for strings and domains, whose length may change on write.
    pub variable_size: bool,
}

impl ObjectEntry {
    pub fn new(name: &'static str, access: AccessType, value: Vec<u8>) -> Self {
        Self {
            name,
            access,
            value,
            variable_size: false,
        }
    }

    /// An entry whose size is not fixed (VISIBLE_STRING, DOMAIN).
    pub fn variable(name: &'static str, access: AccessType, value: Vec<u8>) -> Self {
        Self {
            variable_size: true,
            ..Self::new(name, access, value)
        }
    }

    pub fn u8(name: &'static str, access: AccessType, value: u8) -> Self {
        Self::new(name, access, value.to_le_bytes().to_vec())
    }

    pub fn u16(name: &'static str, access: AccessType, value: u16) -> Self {
        Self::new(name, access, value.to_le_bytes().to_vec())
    }

    pub fn u32(name: &'static str, access: AccessType, value: u32) -> Self {
        Self::new(name, access, value.to_le_bytes().to_vec())
    }
}
