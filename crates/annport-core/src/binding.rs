use std::fmt;

use crate::TensorDescriptor;

/// Backend-assigned identifier of one graph input or output slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(pub i32);

#[derive(Clone, Debug, PartialEq)]
pub struct BindingInfo {
    pub id: BindingId,
    pub desc: TensorDescriptor,
}

impl BindingInfo {
    pub fn new(id: BindingId, desc: TensorDescriptor) -> Self {
        Self { id, desc }
    }
}

/// Identifier the backend hands out when a network is loaded onto it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NetworkId(pub u32);

/// Opaque token for a network registered in a runtime context.
///
/// The low 32 bits are the registry slot, the high 32 bits the slot
/// generation at load time. A handle kept past its unload never matches the
/// network that later reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NetworkHandle(u64);

impl NetworkHandle {
    pub fn new(slot: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | slot as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn slot(self) -> u32 {
        self.0 as u32
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot(), self.generation())
    }
}
