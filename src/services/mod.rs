pub mod disk_store;
pub mod gatekeeper;
pub mod memory_store;
pub mod storage;
