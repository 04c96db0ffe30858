use annport_core::{AnnError, BindingInfo, NetworkHandle, NetworkId, Result};

/// What the context remembers about one loaded network.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedNetwork {
    pub network_id: NetworkId,
    pub input: BindingInfo,
    pub output: BindingInfo,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<LoadedNetwork>,
}

/// Arena of live networks. A handle is a slot index plus the slot's generation;
/// freeing a slot bumps its generation so old handles stop resolving.
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: LoadedNetwork) -> NetworkHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return NetworkHandle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            entry: Some(entry),
        });
        NetworkHandle::new(index, 1)
    }

    pub fn get(&self, handle: NetworkHandle) -> Result<&LoadedNetwork> {
        self.slots
            .get(handle.slot() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(AnnError::UnknownHandle(handle))
    }

    pub fn remove(&mut self, handle: NetworkHandle) -> Result<LoadedNetwork> {
        let slot = self
            .slots
            .get_mut(handle.slot() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(AnnError::UnknownHandle(handle))?;
        let entry = slot.entry.take().ok_or(AnnError::UnknownHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(handle.slot());
        self.live -= 1;
        Ok(entry)
    }

    pub fn binding(&self, handle: NetworkHandle, is_input: bool) -> Result<&BindingInfo> {
        let entry = self.get(handle)?;
        Ok(if is_input { &entry.input } else { &entry.output })
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn handles(&self) -> Vec<NetworkHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NetworkHandle, &LoadedNetwork)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry
                .as_ref()
                .map(|entry| (NetworkHandle::new(index as u32, slot.generation), entry))
        })
    }
}
