//! Record heap and copying collector.
//!
//! Three spaces hold records:
//! - **permanent**: types, `null`/`true`/`false`, method tables, builtins and
//!   segment globals. Never moved, never reclaimed.
//! - **arena**: a byte-budgeted bump region. Each allocation is charged
//!   `align8(size)` bytes against [`HeapSettings::arena_size`].
//! - **overflow**: records allocated once the arena budget is spent.
//!
//! A non-empty overflow list requests a collection. The collector copies
//! every reachable arena/overflow record into a fresh arena, leaving a
//! forwarding handle in the old slot, then tears down whatever was not
//! copied. Consumers supply roots through [`RootProvider`].

use std::mem;

use log::{debug, warn};

use crate::error::RuntimeError;
use crate::header::{Header, HeaderFlags};
use crate::object::{Body, Record};
use crate::types::{DeinitFn, TypeObject, WalkFn};
use crate::value::{MAX_INDEX, Space, Value};

// ── Public API types ──────────────────────────────────────────────────

/// Consumers implement this to provide GC roots.
///
/// The visitor receives `&mut Value` so the collector can rewrite each
/// root to its relocated handle.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value));
}

// ── Heap settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSettings {
    /// Byte budget of the arena. Must be > 0 and a multiple of 8.
    pub arena_size: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            arena_size: 1 << 20, // 1 MiB
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.arena_size == 0 {
            return Err("arena_size must be > 0");
        }
        if !self.arena_size.is_multiple_of(8) {
            return Err("arena_size must be a multiple of 8");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    /// Arena bytes occupied right after the last cycle.
    pub live_bytes: usize,
    /// Records reclaimed by the last cycle.
    pub last_freed: usize,
    pub total_freed: usize,
    pub arena_capacity: usize,
}

#[inline(always)]
const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

// ── Heap ──────────────────────────────────────────────────────────────

pub struct Heap {
    permanent: Vec<Record>,
    arena: Vec<Record>,
    arena_space: Space,
    arena_used: usize,
    arena_capacity: usize,
    overflow: Vec<Record>,
    stats: GcStats,
}

impl Heap {
    pub fn new(settings: &HeapSettings) -> Self {
        Self {
            permanent: Vec::new(),
            arena: Vec::new(),
            arena_space: Space::Arena0,
            arena_used: 0,
            arena_capacity: settings.arena_size,
            overflow: Vec::new(),
            stats: GcStats {
                arena_capacity: settings.arena_size,
                ..GcStats::default()
            },
        }
    }

    /// Store a fully built record and hand out its handle.
    pub fn allocate(
        &mut self,
        record: Record,
        permanent: bool,
    ) -> Result<Value, RuntimeError> {
        let (space, list) = if permanent {
            (Space::Permanent, &mut self.permanent)
        } else {
            let charge = align8(record.header.size as usize);
            if self.arena_used + charge <= self.arena_capacity {
                self.arena_used += charge;
                (self.arena_space, &mut self.arena)
            } else {
                (Space::Overflow, &mut self.overflow)
            }
        };
        let index = list.len();
        if index > MAX_INDEX {
            return Err(RuntimeError::OutOfMemory);
        }
        list.push(record);
        Ok(Value::new(space, index))
    }

    /// Allocate an instance of `ty`: stamp the header, then run the type's
    /// `init` callback on an empty body.
    pub fn instantiate(
        &mut self,
        ty: Value,
        permanent: bool,
    ) -> Result<Value, RuntimeError> {
        let (size, init) = {
            let t = self.type_object(ty);
            (t.size, t.ops.init)
        };
        let mut body = Body::Empty;
        if let Some(init) = init {
            init(&mut body);
        }
        let flags = if permanent {
            HeaderFlags::NONE
        } else {
            HeaderFlags::COLLECTABLE
        };
        self.allocate(
            Record {
                header: Header::new(ty, flags, size),
                body,
            },
            permanent,
        )
    }

    // ── access ─────────────────────────────────────────────────────

    pub fn get(&self, value: Value) -> Option<&Record> {
        let space = value.space()?;
        let list = match space {
            Space::Permanent => &self.permanent,
            Space::Overflow => &self.overflow,
            s if s == self.arena_space => &self.arena,
            _ => return None,
        };
        list.get(value.index())
    }

    pub fn get_mut(&mut self, value: Value) -> Option<&mut Record> {
        let space = value.space()?;
        let list = match space {
            Space::Permanent => &mut self.permanent,
            Space::Overflow => &mut self.overflow,
            s if s == self.arena_space => &mut self.arena,
            _ => return None,
        };
        list.get_mut(value.index())
    }

    /// # Panics
    ///
    /// On a null or stale handle. Every handle the VM holds is a root or
    /// reachable from one, so this only fires on a collector bug.
    #[inline]
    pub fn record(&self, value: Value) -> &Record {
        match self.get(value) {
            Some(record) => record,
            None => panic!("dangling handle {value:?}"),
        }
    }

    #[inline]
    pub fn record_mut(&mut self, value: Value) -> &mut Record {
        match self.get_mut(value) {
            Some(record) => record,
            None => panic!("dangling handle {value:?}"),
        }
    }

    #[inline]
    pub fn body(&self, value: Value) -> &Body {
        &self.record(value).body
    }

    #[inline]
    pub fn body_mut(&mut self, value: Value) -> &mut Body {
        &mut self.record_mut(value).body
    }

    #[inline]
    pub fn type_of(&self, value: Value) -> Value {
        self.record(value).header.ty
    }

    pub fn type_object(&self, ty: Value) -> &TypeObject {
        match &self.record(ty).body {
            Body::Type(t) => t,
            other => panic!("{ty:?} is not a type: {other:?}"),
        }
    }

    pub fn type_object_mut(&mut self, ty: Value) -> &mut TypeObject {
        match &mut self.record_mut(ty).body {
            Body::Type(t) => t,
            other => panic!("{ty:?} is not a type: {other:?}"),
        }
    }

    pub fn is_collectable(&self, value: Value) -> bool {
        self.get(value)
            .is_some_and(|r| r.header.has_flag(HeaderFlags::COLLECTABLE))
    }

    // ── collection ─────────────────────────────────────────────────

    #[inline]
    pub fn needs_collection(&self) -> bool {
        !self.overflow.is_empty()
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Records currently held in the arena and overflow list.
    pub fn collectable_count(&self) -> usize {
        self.arena.len() + self.overflow.len()
    }

    pub fn arena_used(&self) -> usize {
        self.arena_used
    }

    /// Run one full copying collection.
    pub fn collect(&mut self, roots: &mut dyn RootProvider) {
        let from_space = self.arena_space;
        let to_space = from_space.other_arena();
        let mut gc = Collector {
            permanent: &mut self.permanent,
            from_space,
            from_arena: mem::take(&mut self.arena),
            from_overflow: mem::take(&mut self.overflow),
            to_space,
            to: Vec::new(),
            to_bytes: 0,
            gray: Vec::new(),
            marked: Vec::new(),
        };

        roots.visit_roots(&mut |value| gc.relocate(value));
        gc.scan();
        let freed = gc.sweep();
        gc.unmark();

        let Collector { to, to_bytes, .. } = gc;
        self.arena = to;
        self.arena_space = to_space;
        self.arena_used = to_bytes;

        if to_bytes > self.arena_capacity / 2 {
            let old = self.arena_capacity;
            while to_bytes > self.arena_capacity / 2 {
                self.arena_capacity *= 2;
            }
            warn!(
                "gc: {to_bytes} live bytes, growing arena {old} -> {}",
                self.arena_capacity
            );
        }

        self.stats.collections += 1;
        self.stats.live_bytes = to_bytes;
        self.stats.last_freed = freed;
        self.stats.total_freed += freed;
        self.stats.arena_capacity = self.arena_capacity;
        debug!(
            "gc #{}: {} records live ({to_bytes} bytes), {freed} freed, arena {}",
            self.stats.collections,
            self.arena.len(),
            self.arena_capacity
        );
    }
}

// ── Collector ─────────────────────────────────────────────────────────

/// State of one collection cycle.
struct Collector<'h> {
    permanent: &'h mut Vec<Record>,
    from_space: Space,
    from_arena: Vec<Record>,
    from_overflow: Vec<Record>,
    to_space: Space,
    to: Vec<Record>,
    to_bytes: usize,
    /// Non-moving records whose children still need scanning.
    gray: Vec<usize>,
    /// Every permanent record marked this cycle.
    marked: Vec<usize>,
}

impl Collector<'_> {
    fn from_list(&mut self, space: Space) -> &mut Vec<Record> {
        if space == Space::Overflow {
            &mut self.from_overflow
        } else {
            &mut self.from_arena
        }
    }

    /// Rewrite `value` to the post-collection handle of its record,
    /// copying the record into to-space on first visit.
    fn relocate(&mut self, value: &mut Value) {
        let Some(space) = value.space() else {
            return;
        };
        let index = value.index();

        if space == Space::Permanent {
            let header = &mut self.permanent[index].header;
            if !header.has_flag(HeaderFlags::MARKED) {
                header.add_flag(HeaderFlags::MARKED);
                self.marked.push(index);
                self.gray.push(index);
            }
            return;
        }
        if space == self.to_space {
            return;
        }
        debug_assert!(space == self.from_space || space == Space::Overflow);

        let header = self.from_list(space)[index].header;
        if header.has_flag(HeaderFlags::MOVED) {
            *value = header.forward;
            return;
        }

        // the type goes first; types are values too
        let mut ty = header.ty;
        self.relocate(&mut ty);

        let new_value = Value::new(self.to_space, self.to.len());
        let old = &mut self.from_list(space)[index];
        let body = mem::take(&mut old.body);
        old.header.add_flag(HeaderFlags::MOVED);
        old.header.forward = new_value;

        self.to_bytes += align8(header.size as usize);
        self.to.push(Record {
            header: Header::new(ty, header.flags, header.size),
            body,
        });
        *value = new_value;
    }

    /// The walk callback of the type `ty`, wherever that type now lives.
    fn walk_of(&self, ty: Value) -> Option<WalkFn> {
        self.type_of_record(ty).and_then(|t| t.ops.walk)
    }

    fn deinit_of(&self, ty: Value) -> Option<DeinitFn> {
        self.type_of_record(ty).and_then(|t| t.ops.deinit)
    }

    fn type_of_record(&self, ty: Value) -> Option<&TypeObject> {
        let space = ty.space()?;
        let index = ty.index();
        let record = match space {
            Space::Permanent => &self.permanent[index],
            s if s == self.to_space => &self.to[index],
            Space::Overflow => self.forwarded(&self.from_overflow[index]),
            _ => self.forwarded(&self.from_arena[index]),
        };
        match &record.body {
            Body::Type(t) => Some(t),
            _ => None,
        }
    }

    fn forwarded<'a>(&'a self, record: &'a Record) -> &'a Record {
        if record.header.has_flag(HeaderFlags::MOVED) {
            &self.to[record.header.forward.index()]
        } else {
            record
        }
    }

    /// Cheney scan over to-space, interleaved with the gray permanent
    /// records, until both are exhausted.
    fn scan(&mut self) {
        let mut next = 0;
        loop {
            if next < self.to.len() {
                let ty = self.to[next].header.ty;
                if let Some(walk) = self.walk_of(ty) {
                    let mut body = mem::take(&mut self.to[next].body);
                    walk(&mut body, &mut |child| self.relocate(child));
                    self.to[next].body = body;
                }
                next += 1;
            } else if let Some(index) = self.gray.pop() {
                let ty = self.permanent[index].header.ty;
                if let Some(walk) = self.walk_of(ty) {
                    let mut body = mem::take(&mut self.permanent[index].body);
                    walk(&mut body, &mut |child| self.relocate(child));
                    self.permanent[index].body = body;
                }
            } else {
                break;
            }
        }
    }

    /// Tear down every record that was not copied, arena first, then the
    /// overflow list, each in allocation order.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for space in [self.from_space, Space::Overflow] {
            let len = self.from_list(space).len();
            for index in 0..len {
                let header = self.from_list(space)[index].header;
                if header.has_flag(HeaderFlags::MOVED) {
                    continue;
                }
                if let Some(deinit) = self.deinit_of(header.ty) {
                    deinit(&mut self.from_list(space)[index].body);
                }
                freed += 1;
            }
        }
        freed
    }

    fn unmark(&mut self) {
        for &index in &self.marked {
            self.permanent[index]
                .header
                .remove_flag(HeaderFlags::MARKED);
        }
    }
}
