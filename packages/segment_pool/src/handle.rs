use std::fmt;

use crate::NodeId;

/// Stable identity of a rented range.
///
/// A [`Token`][crate::Token] only ever stores its `TokenId`, never a position inside a segment.
/// The pool resolves the id through its handle table on every access, which is what allows
/// [`SegmentPool::trim_excess()`][crate::SegmentPool::trim_excess] to move data without
/// invalidating outstanding tokens.
///
/// Ids are generational: once a token has been released, its id never resolves again, even if
/// the underlying slot is later reused by a different token.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TokenId {
    index: u32,
    generation: u32,
}

impl TokenId {
    /// The index of the handle slot this id refers to.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    /// The generation of the handle slot at the time the id was issued.
    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What a live token is currently bound to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Binding {
    pub(crate) node: NodeId,
    pub(crate) clear_on_release: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Entry,
}

#[derive(Debug)]
enum Entry {
    Occupied(Binding),

    Vacant { next_free_index: Option<u32> },
}

/// The indirection table between [`TokenId`]s and nodes.
///
/// Vacant slots form an intrusive free list threaded through the slots themselves, so issuing
/// and releasing ids never allocates once the table has grown to its working size.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    slots: Vec<Slot>,

    /// Head of the vacant slot list, if any slot is vacant.
    next_free_index: Option<u32>,

    count: usize,
}

impl HandleTable {
    /// The number of live ids in the table.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    /// The id that the next call to [`insert()`][Self::insert] will return.
    ///
    /// This allows the caller to tag the bound node with its owner before registering it.
    #[must_use]
    pub(crate) fn next_id(&self) -> TokenId {
        match self.next_free_index {
            Some(index) => {
                let slot = self.slot(index);

                TokenId {
                    index,
                    generation: slot.generation,
                }
            }
            None => TokenId {
                index: u32::try_from(self.slots.len())
                    .expect("more than u32::MAX live tokens is not a supported scenario"),
                generation: 0,
            },
        }
    }

    /// Registers a node and returns the id that now resolves to it.
    pub(crate) fn insert(&mut self, node: NodeId) -> TokenId {
        let id = self.next_id();

        let binding = Entry::Occupied(Binding {
            node,
            clear_on_release: false,
        });

        if let Some(index) = self.next_free_index {
            let slot = self.slot_mut(index);

            let Entry::Vacant { next_free_index } = slot.entry else {
                panic!("slot at head of vacant list must be vacant");
            };

            slot.entry = binding;
            self.next_free_index = next_free_index;
        } else {
            self.slots.push(Slot {
                generation: id.generation,
                entry: binding,
            });
        }

        self.count = self
            .count
            .checked_add(1)
            .expect("we just verified the slot index fits in u32, so the count fits in usize");

        id
    }

    /// Resolves an id to its binding, if the id is still live.
    #[must_use]
    pub(crate) fn get(&self, id: TokenId) -> Option<Binding> {
        let slot = self.slots.get(id.index as usize)?;

        match slot.entry {
            Entry::Occupied(binding) if slot.generation == id.generation => Some(binding),
            _ => None,
        }
    }

    /// Points a live id at a different node. Returns `false` if the id is not live.
    pub(crate) fn rebind(&mut self, id: TokenId, node: NodeId) -> bool {
        match self.binding_mut(id) {
            Some(binding) => {
                binding.node = node;
                true
            }
            None => false,
        }
    }

    /// Updates the clear-on-release flag of a live id. Returns `false` if the id is not live.
    pub(crate) fn set_clear_on_release(&mut self, id: TokenId, enabled: bool) -> bool {
        match self.binding_mut(id) {
            Some(binding) => {
                binding.clear_on_release = enabled;
                true
            }
            None => false,
        }
    }

    /// Unregisters an id, returning what it was bound to. The id never resolves again.
    pub(crate) fn remove(&mut self, id: TokenId) -> Option<Binding> {
        let binding = self.get(id)?;

        let next_free_index = self.next_free_index;
        let slot = self.slot_mut(id.index);

        slot.entry = Entry::Vacant { next_free_index };
        // Wrapping is fine: an id would need to sit unused through 2^32 reuses of its slot
        // before it could alias a new occupant.
        slot.generation = slot.generation.wrapping_add(1);

        self.next_free_index = Some(id.index);
        self.count = self
            .count
            .checked_sub(1)
            .expect("we just resolved a live id, so the count is at least 1");

        Some(binding)
    }

    /// All live ids with their bindings, in slot order.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (TokenId, Binding)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot.entry {
            Entry::Occupied(binding) => Some((
                TokenId {
                    index: u32::try_from(index).expect("slot count is limited to u32 on insert"),
                    generation: slot.generation,
                },
                binding,
            )),
            Entry::Vacant { .. } => None,
        })
    }

    fn binding_mut(&mut self, id: TokenId) -> Option<&mut Binding> {
        let slot = self.slots.get_mut(id.index as usize)?;

        if slot.generation != id.generation {
            return None;
        }

        match &mut slot.entry {
            Entry::Occupied(binding) => Some(binding),
            Entry::Vacant { .. } => None,
        }
    }

    fn slot(&self, index: u32) -> &Slot {
        self.slots
            .get(index as usize)
            .expect("vacant list only refers to existing slots")
    }

    fn slot_mut(&mut self, index: u32) -> &mut Slot {
        self.slots
            .get_mut(index as usize)
            .expect("vacant list only refers to existing slots")
    }
}
