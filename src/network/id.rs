//! Identity types for the processor network.
//!
//! Processors live in an arena owned by the network; a `ProcessorId` is the
//! index of a processor's slot. Ports and properties are addressed by packed
//! handles that combine the owning processor's index with the element's index
//! inside that processor, so every cross-reference (connections, links, cache
//! keys) is a plain `Copy` value instead of a pointer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the network's processor arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorId(pub u32);

impl ProcessorId {
    pub const INVALID: ProcessorId = ProcessorId(u32::MAX);
    /// Processor indices must fit beside a 12-bit element index.
    pub const MAX_PROCESSORS: usize = 1 << (32 - ELEMENT_INDEX_BITS);

    /// `None` once `index` can no longer be packed into element handles.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < Self::MAX_PROCESSORS).then_some(ProcessorId(index as u32))
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ProcessorId(INVALID)")
        } else {
            write!(f, "ProcessorId({})", self.0)
        }
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const ELEMENT_INDEX_BITS: u32 = 12;

/// Declares a handle packing a processor index (high 20 bits) with an element
/// index (low 12 bits). Supports ~1M processors with 4096 elements each.
macro_rules! processor_element_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            const ELEMENT_BITS: u32 = ELEMENT_INDEX_BITS;
            const ELEMENT_MASK: u32 = (1 << Self::ELEMENT_BITS) - 1;
            pub const MAX_ELEMENTS: usize = 1 << Self::ELEMENT_BITS;

            pub fn new(processor: ProcessorId, element: u16) -> Self {
                debug_assert!((element as usize) < Self::MAX_ELEMENTS);
                Self((processor.0 << Self::ELEMENT_BITS) | (element as u32 & Self::ELEMENT_MASK))
            }

            #[inline]
            pub fn processor(self) -> ProcessorId {
                ProcessorId(self.0 >> Self::ELEMENT_BITS)
            }

            #[inline]
            pub fn index(self) -> usize {
                (self.0 & Self::ELEMENT_MASK) as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}(processor={}, index={})",
                    stringify!($name),
                    self.processor().0,
                    self.index()
                )
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

processor_element_id!(
    /// Handle of a consuming port.
    InportId
);
processor_element_id!(
    /// Handle of a producing port.
    OutportId
);
processor_element_id!(
    /// Handle of a property, including properties nested in composites.
    PropertyId
);

/// Handle returned when registering a network observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u32);
