use crate::value::Value;

/// GC / bookkeeping flags of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
    pub const NONE: Self = Self(0);
    /// May be moved and reclaimed by the collector.
    pub const COLLECTABLE: Self = Self(1 << 0);
    /// Relocated during the current collection; `forward` is valid.
    pub const MOVED: Self = Self(1 << 1);
    /// A non-collectable record already queued for scanning this cycle.
    pub const MARKED: Self = Self(1 << 2);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }
}

/// Bytes every record is charged for its header.
pub const HEADER_SIZE: u32 = 16;

/// The fixed prefix of every record.
///
/// ```text
/// forward: Value        relocation target, valid only while MOVED
/// ty:      Value        the record's type (itself a record)
/// flags:   HeaderFlags
/// size:    u32          instance size charged against the arena
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub forward: Value,
    pub ty: Value,
    pub flags: HeaderFlags,
    pub size: u32,
}

impl Header {
    pub fn new(ty: Value, flags: HeaderFlags, size: u32) -> Self {
        Self {
            forward: Value::NULL_REF,
            ty,
            flags,
            size,
        }
    }

    #[inline(always)]
    pub fn has_flag(&self, flag: HeaderFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline(always)]
    pub fn add_flag(&mut self, flag: HeaderFlags) {
        self.flags = self.flags.with(flag);
    }

    #[inline(always)]
    pub fn remove_flag(&mut self, flag: HeaderFlags) {
        self.flags = self.flags.without(flag);
    }
}
