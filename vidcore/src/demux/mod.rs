mod read_loop;
mod select;

pub(crate) use read_loop::{ReadLoop, StreamSlot};
pub use select::{Selection, StreamSpecifier, find_best_stream, select_streams};
