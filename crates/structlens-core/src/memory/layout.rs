//! Memory layout constants for the foreign process's standard-library types
//!
//! The target is a 64-bit MSVC build. Every container header below is read
//! from the outside with no type metadata, so these offsets are the whole
//! contract.

/// Pointer-sized values
pub mod pointer {
    pub const SIZE: u64 = 8;
}

/// Control block and node layout of the red-black tree behind
/// `std::map` / `std::set`
pub mod tree {
    /// Control block: sentinel (head) node pointer
    pub const HEAD: u64 = 0x0;
    /// Control block: element count
    pub const SIZE: u64 = 0x8;
    /// Control block width as embedded in a parent struct
    pub const HEADER_SIZE: u64 = 16;

    pub const NODE_LEFT: u64 = 0x0;
    pub const NODE_PARENT: u64 = 0x8;
    pub const NODE_RIGHT: u64 = 0x10;
    pub const NODE_COLOR: u64 = 0x18;
    pub const NODE_IS_NIL: u64 = 0x19;

    /// Key offset within a node, keyed by the largest alignment of the key
    /// and value types.
    ///
    /// Rows are `(max alignment, key offset)`, searched in order; the first
    /// row whose alignment is >= the requested one wins.
    pub const KEY_OFFSET_BY_ALIGNMENT: &[(u64, u64)] = &[(2, 0x1A), (4, 0x1C), (8, 0x20)];

    /// Effective alignment of the value that follows the key, same row
    /// format as [`KEY_OFFSET_BY_ALIGNMENT`].
    pub const VALUE_ALIGNMENT_BUCKETS: &[(u64, u64)] = &[(1, 1), (2, 2), (4, 4), (8, 8)];
}

/// `std::string` / `std::wstring` layout
pub mod string {
    /// Inline buffer or heap pointer, depending on capacity
    pub const DATA: u64 = 0x0;
    pub const LENGTH: u64 = 0x10;
    pub const CAPACITY: u64 = 0x18;
    pub const HEADER_SIZE: u64 = 32;

    /// Size of the inline small-string buffer in bytes
    pub const INLINE_BUFFER_BYTES: u64 = 16;
}

/// `std::vector` layout
pub mod vector {
    pub const BEGIN: u64 = 0x0;
    pub const END: u64 = 0x8;
    pub const CAPACITY_END: u64 = 0x10;
    pub const HEADER_SIZE: u64 = 24;
}

/// Virtual function tables
pub mod vtable {
    /// Width of one code-pointer slot
    pub const SLOT_SIZE: u64 = 8;
    /// Width of the vtable pointer at the start of a polymorphic object
    pub const POINTER_SIZE: u64 = 8;
}

/// Timing constants for refresh loops
pub mod timing {
    /// Default interval between refreshes of a watched object (ms)
    pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 500;
}
