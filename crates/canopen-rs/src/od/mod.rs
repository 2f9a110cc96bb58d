// crates/canopen-rs/src/od/mod.rs
//! A minimal in-memory object dictionary, enough to back an SDO server.

mod entry;

pub use entry::{AccessType, ObjectEntry};

use crate::hal::{ObjectAccess, ObjectInfo};
use crate::sdo::SdoAbortCode;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use log::trace;

/// The main Object Dictionary structure, keyed by (index, sub-index).
#[derive(Debug, Clone, Default)]
pub struct ObjectDictionary {
    entries: BTreeMap<(u16, u8), ObjectEntry>,
}

impl ObjectDictionary {
    /// Creates a new, empty OD.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any previous one at the same address.
    pub fn insert(&mut self, index: u16, sub_index: u8, entry: ObjectEntry) {
        self.entries.insert((index, sub_index), entry);
    }

    pub fn get(&self, index: u16, sub_index: u8) -> Option<&ObjectEntry> {
        self.entries.get(&(index, sub_index))
    }

    /// Reads the raw value of an entry.
    pub fn read(&self, index: u16, sub_index: u8) -> Option<&[u8]> {
        self.get(index, sub_index).map(|e| e.value.as_slice())
    }

    pub fn read_u8(&self, index: u16, sub_index: u8) -> Option<u8> {
        let bytes = self.read(index, sub_index)?;
        Some(u8::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn read_u16(&self, index: u16, sub_index: u8) -> Option<u16> {
        let bytes = self.read(index, sub_index)?;
        Some(u16::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn read_u32(&self, index: u16, sub_index: u8) -> Option<u32> {
        let bytes = self.read(index, sub_index)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Writes a value, enforcing the entry's size but not its access rights.
    /// Returns the SDO abort code describing a refusal.
    pub fn write(&mut self, index: u16, sub_index: u8, data: &[u8]) -> Result<(), SdoAbortCode> {
        let has_index = self.entries.range((index, 0)..=(index, u8::MAX)).next().is_some();
        let Some(entry) = self.entries.get_mut(&(index, sub_index)) else {
            return Err(if has_index {
                SdoAbortCode::NoSuchSubIndex
            } else {
                SdoAbortCode::NoSuchObject
            });
        };
        if !entry.variable_size && data.len() != entry.value.len() {
            return Err(if data.len() > entry.value.len() {
                SdoAbortCode::LengthTooHigh
            } else {
                SdoAbortCode::LengthTooLow
            });
        }
        trace!(
            "[OD] Write 0x{:04X}/{} ({}) = {:02X?}",
            index, sub_index, entry.name, data
        );
        entry.value = Vec::from(data);
        Ok(())
    }
}

impl ObjectAccess for ObjectDictionary {
    fn lookup(&self, index: u16, sub_index: u8) -> Option<ObjectInfo> {
        self.get(index, sub_index).map(|entry| ObjectInfo {
            value: entry.value.clone(),
            access: entry.access,
        })
    }

    fn commit(&mut self, index: u16, sub_index: u8, data: &[u8]) -> Result<(), u32> {
        self.write(index, sub_index, data).map_err(SdoAbortCode::code)
    }
}
