use serde::Serialize;

/// Number of bits used for the minor part of a device number.
pub const MINOR_BITS: u32 = 20;
/// Largest minor number a device number can carry.
pub const MINOR_MASK: u32 = (1 << MINOR_BITS) - 1;
/// Largest major number a device number can carry.
pub const MAJOR_MAX: u32 = (1 << (32 - MINOR_BITS)) - 1;

/// A packed (major, minor) device number, laid out like the kernel's `dev_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DevT(u32);

impl DevT {
    /// Packs a major and minor number. Bits outside the valid ranges are masked off.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self(((major & MAJOR_MAX) << MINOR_BITS) | (minor & MINOR_MASK))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 >> MINOR_BITS
    }

    pub const fn minor(self) -> u32 {
        self.0 & MINOR_MASK
    }

    /// Whether `other` falls within `count` minors starting at `self`.
    pub fn covers(self, count: u32, other: DevT) -> bool {
        self.major() == other.major()
            && other.minor() >= self.minor()
            && u64::from(other.minor()) < self.end(count)
    }

    /// Whether `count` minors from `self` share any number with `other_count` minors from `other`.
    pub fn overlaps(self, count: u32, other: DevT, other_count: u32) -> bool {
        self.major() == other.major()
            && u64::from(self.minor()) < other.end(other_count)
            && u64::from(other.minor()) < self.end(count)
    }

    /// One past the last minor of a `count`-wide range, without wrapping.
    pub fn end(self, count: u32) -> u64 {
        u64::from(self.minor()) + u64::from(count)
    }
}

impl std::fmt::Display for DevT {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}
