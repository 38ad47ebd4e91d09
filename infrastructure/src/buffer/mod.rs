//! Stream resumption buffer adapter

mod memory;

pub use memory::InMemoryStreamBuffer;
