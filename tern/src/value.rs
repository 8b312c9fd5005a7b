use std::fmt;

const SPACE_SHIFT: u32 = 30;
const INDEX_MASK: u32 = (1 << SPACE_SHIFT) - 1;

/// Largest record index a space may hand out. The all-ones pattern is
/// reserved for [`Value::NULL_REF`].
pub(crate) const MAX_INDEX: usize = INDEX_MASK as usize - 1;

/// The region a record lives in.
///
/// There are two arena spaces so that a collection can copy from one into
/// the other while both sets of handles stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Space {
    /// Process-wide, never moved or reclaimed.
    Permanent = 0,
    Arena0 = 1,
    Arena1 = 2,
    /// Records that did not fit the current arena.
    Overflow = 3,
}

impl Space {
    #[inline(always)]
    pub(crate) fn other_arena(self) -> Self {
        match self {
            Self::Arena0 => Self::Arena1,
            _ => Self::Arena0,
        }
    }
}

/// A reference to a heap record.
///
/// Encoding (32 bits):
/// - bits 30‥31: [`Space`]
/// - bits 0‥29:  record index inside that space
///
/// Handles are only meaningful together with the heap that issued them.
/// Arena handles change when the collector relocates a record; permanent
/// handles never do.
///
/// An arena or overflow handle is valid until the next collection. After
/// it the handle may fail to resolve, and once the two arenas have swapped
/// back it can name an unrelated record. Nothing detects such reuse, so a
/// host that keeps a value across collections stores it in a namespace and
/// reads it back.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u32);

impl Value {
    /// The null reference: refers to no record at all. Distinct from the
    /// language-level `null` object.
    pub const NULL_REF: Value = Value(u32::MAX);

    #[inline(always)]
    pub(crate) const fn new(space: Space, index: usize) -> Self {
        debug_assert!(index <= MAX_INDEX);
        Self(((space as u32) << SPACE_SHIFT) | (index as u32 & INDEX_MASK))
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn is_null_ref(self) -> bool {
        self.0 == u32::MAX
    }

    /// `None` for the null reference.
    #[inline(always)]
    pub fn space(self) -> Option<Space> {
        if self.is_null_ref() {
            return None;
        }
        Some(match self.0 >> SPACE_SHIFT {
            0 => Space::Permanent,
            1 => Space::Arena0,
            2 => Space::Arena1,
            _ => Space::Overflow,
        })
    }

    #[inline(always)]
    pub(crate) const fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.space() {
            None => write!(f, "Value(null-ref)"),
            Some(space) => write!(f, "Value({space:?}:{})", self.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_and_index_round_trip() {
        for space in [Space::Permanent, Space::Arena0, Space::Arena1, Space::Overflow]
        {
            let v = Value::new(space, 12345);
            assert_eq!(v.space(), Some(space));
            assert_eq!(v.index(), 12345);
            assert!(!v.is_null_ref());
        }
        let top = Value::new(Space::Overflow, MAX_INDEX);
        assert!(!top.is_null_ref());
    }

    #[test]
    fn null_ref_has_no_space() {
        assert!(Value::NULL_REF.is_null_ref());
        assert_eq!(Value::NULL_REF.space(), None);
        assert_eq!(format!("{:?}", Value::NULL_REF), "Value(null-ref)");
    }

    #[test]
    fn arenas_alternate() {
        assert_eq!(Space::Arena0.other_arena(), Space::Arena1);
        assert_eq!(Space::Arena1.other_arena(), Space::Arena0);
    }
}
