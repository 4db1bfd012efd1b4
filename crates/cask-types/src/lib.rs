pub mod checksum;

pub use checksum::{Checksum, ChecksumHasher};
