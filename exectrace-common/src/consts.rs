// limits of the per event enumerations
pub const MAX_ARGS: usize = 32;
pub const MAX_ENVS: usize = 64;
pub const MAX_PATH_DEPTH: usize = 20;

// record field capacities, terminating null byte included
pub const COMM_SIZE: usize = 16;
pub const FILENAME_SIZE: usize = 256;
// a text record (id, bytes and length) fills exactly one page
pub const MAX_STR_SIZE: usize = PAGE_SIZE - 2 * core::mem::size_of::<u64>();
pub const PATH_SEGMENT_SIZE: usize = 32;

// number of pages reserved for each ring buffer
pub const RING_PAGES: usize = 512;
pub const PAGE_SIZE: usize = 4096;
