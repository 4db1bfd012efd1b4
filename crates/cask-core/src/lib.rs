pub mod backup;
pub mod btree;
pub mod check;
pub mod chunker;
pub mod compress;
pub mod config;
pub mod error;
pub mod events;
pub mod exporter;
pub mod importer;
pub mod info;
pub mod object;
pub mod platform;
pub mod registry;
pub mod repo;
pub mod restore;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod sync;
pub mod vfs;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
