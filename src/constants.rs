pub const UINT8_COUNT: usize = u8::MAX as usize + 1;

pub const MAX_FRAME_COUNT: usize = 64;
pub const MAX_STACK_SIZE: usize = MAX_FRAME_COUNT * UINT8_COUNT;

// First collection fires once a megabyte of object memory is live; afterwards
// the watermark is bytes-after-sweep times the grow factor.
pub const GC_FIRST_TRIGGER_BYTES: usize = 1024 * 1024;
pub const GC_HEAP_GROW_FACTOR: usize = 2;
