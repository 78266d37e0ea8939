bitflags::bitflags! {
    /// A region in a [`CompactHeightfield`](crate::CompactHeightfield).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionId: u16 {
        /// The default region, which is used for spans that are not in a region.
        const NONE = 0;
        /// Heightfield border flag.
        /// If a heightfield region ID has this bit set, then the region is a border
        /// region and its spans are considered un-walkable.
        const BORDER_REGION = 0x8000;
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u16> for RegionId {
    fn from(value: u16) -> Self {
        RegionId::from_bits_retain(value)
    }
}

impl RegionId {
    /// Whether the id marks a border region painted around the heightfield.
    #[inline]
    pub fn is_border(self) -> bool {
        self.contains(Self::BORDER_REGION)
    }

    /// The id without the border flag.
    #[inline]
    pub fn id(self) -> u16 {
        self.bits() & !Self::BORDER_REGION.bits()
    }
}
