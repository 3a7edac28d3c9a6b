//! Typed arena allocation backing the hot paths of the native core.
//!
//! Every component that allocates on a request/response/cache/router/task
//! lifecycle does so through a [`TypedArena`] tagged with the owning
//! subsystem (§3 "Arena"). REQUEST and RESPONSE arenas are created fresh per
//! request and dropped (bulk-freed) when the request completes; ROUTER,
//! CACHE, and TASK arenas live for the process lifetime. No pointer handed
//! out by an arena is valid after that arena is reset or dropped — callers
//! must not let borrowed slices/strings outlive the owning arena.

use std::sync::atomic::{AtomicUsize, Ordering};

use typed_arena::Arena;

/// Which subsystem an arena's memory belongs to (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaTag {
    Request,
    Response,
    Router,
    Cache,
    Task,
    Static,
    Stream,
    Upload,
}

impl ArenaTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaTag::Request => "request",
            ArenaTag::Response => "response",
            ArenaTag::Router => "router",
            ArenaTag::Cache => "cache",
            ArenaTag::Task => "task",
            ArenaTag::Static => "static",
            ArenaTag::Stream => "stream",
            ArenaTag::Upload => "upload",
        }
    }
}

/// A byte/string bump allocator tagged with its owning subsystem.
///
/// Backed by `typed_arena`, which never moves or frees individual
/// allocations until the whole arena is dropped. `reset` replaces the
/// arena with a fresh one, which is the bulk-free operation the spec calls
/// for at end-of-request.
pub struct TypedArena {
    tag: ArenaTag,
    bytes: Arena<u8>,
    strings: Arena<String>,
    allocated: AtomicUsize,
}

impl TypedArena {
    pub fn new(tag: ArenaTag) -> Self {
        Self {
            tag,
            bytes: Arena::new(),
            strings: Arena::new(),
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn tag(&self) -> ArenaTag {
        self.tag
    }

    /// Copies `data` into the arena and returns a reference valid until reset.
    pub fn alloc_bytes(&self, data: &[u8]) -> &[u8] {
        self.allocated.fetch_add(data.len(), Ordering::Relaxed);
        self.bytes.alloc_extend(data.iter().copied())
    }

    /// Moves an owned `String` into the arena and returns a `&str` view.
    pub fn alloc_str(&self, s: impl Into<String>) -> &str {
        let s = s.into();
        self.allocated.fetch_add(s.len(), Ordering::Relaxed);
        self.strings.alloc(s).as_str()
    }

    /// Total bytes handed out since creation (or last reset).
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Bulk-frees everything allocated so far. Any reference obtained from
    /// this arena before the call must not be used afterwards — the borrow
    /// checker enforces this because `reset` takes `&mut self`.
    pub fn reset(&mut self) {
        let tag = self.tag;
        *self = Self::new(tag);
    }
}

/// The per-request arena: path params, query strings, validation
/// intermediates, and any other request-local allocation live here and are
/// dropped in one shot when the request finishes.
pub struct RequestArena(TypedArena);

impl RequestArena {
    pub fn new() -> Self {
        Self(TypedArena::new(ArenaTag::Request))
    }
}

impl Default for RequestArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for RequestArena {
    type Target = TypedArena;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The per-response arena: buffered body construction and header formatting.
pub struct ResponseArena(TypedArena);

impl ResponseArena {
    pub fn new() -> Self {
        Self(TypedArena::new(ArenaTag::Response))
    }
}

impl Default for ResponseArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for ResponseArena {
    type Target = TypedArena;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_bytes_roundtrips() {
        let arena = TypedArena::new(ArenaTag::Request);
        let a = arena.alloc_bytes(b"hello");
        let b = arena.alloc_bytes(b"world");
        assert_eq!(a, b"hello");
        assert_eq!(b, b"world");
        assert_eq!(arena.allocated_bytes(), 10);
    }

    #[test]
    fn reset_drops_prior_allocations_but_arena_is_reusable() {
        let mut arena = TypedArena::new(ArenaTag::Request);
        arena.alloc_bytes(b"transient");
        assert_eq!(arena.allocated_bytes(), 9);
        arena.reset();
        assert_eq!(arena.allocated_bytes(), 0);
        let s = arena.alloc_str("fresh".to_string());
        assert_eq!(s, "fresh");
    }

    #[test]
    fn request_arena_tag() {
        let arena = RequestArena::new();
        assert_eq!(arena.tag(), ArenaTag::Request);
    }
}
