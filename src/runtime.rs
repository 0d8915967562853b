pub mod beta;
pub mod debug;
pub mod flatten;
pub mod reduce;
pub mod store;
pub mod unflatten;

pub use crate::runtime::debug::{audit, gc_clean, show_chain, show_node};
pub use crate::runtime::flatten::{flatten, Code, GlobalRef, Globals, NoGlobals};
pub use crate::runtime::reduce::{reduce, Mode};
pub use crate::runtime::store::{Ix, Literal, Node, Slot, Store, Variety, NIL};
pub use crate::runtime::unflatten::unflatten;

// Rough in-memory cost of one node with its slot vector.
const NODE_BYTES: u64 = 96;

pub const MIN_CAPACITY: usize = 1 << 20;
pub const MAX_CAPACITY: usize = 1 << 28;

// Node capacity for `--size auto`: a quarter of available memory.
pub fn default_capacity() -> usize {
  use sysinfo::{System, SystemExt};
  let mut sys = System::new();
  sys.refresh_memory();
  let nodes = (sys.available_memory() / 4 / NODE_BYTES) as usize;
  nodes.clamp(MIN_CAPACITY, MAX_CAPACITY)
}
