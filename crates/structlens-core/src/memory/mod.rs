pub mod layout;
mod pattern;
#[cfg(target_os = "windows")]
mod process;
mod reader;
mod snapshot;

#[cfg(test)]
pub mod mock;

pub use pattern::{find_in_buffer, format_pattern, parse_pattern};
#[cfg(target_os = "windows")]
pub use process::{MemoryReader, ProcessHandle};
pub use reader::{ReadMemory, WriteMemory};
pub use snapshot::{SnapshotReader, SnapshotRegion};

#[cfg(test)]
pub use mock::{MockMemoryBuilder, MockMemoryReader};
