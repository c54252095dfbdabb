//! # Utility Functions and Types
//!
//! Common helpers shared by the TS pipe implementations.
//!
//! ## CRC Calculation
//!
//! ```rust
//! use mpegts_demux::utils::Crc32Mpeg2;
//!
//! let crc = Crc32Mpeg2::new();
//! let checksum = crc.calculate(b"Hello, world!");
//! println!("CRC32: {:08x}", checksum);
//! ```

/// CRC calculation implementations
pub mod crc;

// Re-export commonly used types
pub use crc::Crc32Mpeg2;
