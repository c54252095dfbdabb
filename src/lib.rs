#![doc(html_root_url = "https://docs.rs/mpegts-demux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # mpegts-demux
//!
//! A hierarchical MPEG Transport Stream demultiplexer: a tree of composable
//! inner pipes that turns a byte-aligned (or not-yet-aligned) block stream
//! into per-elementary-stream output flows, discovering program structure
//! via PAT/PMT and classifying the broadcast conformance regime (ISO, DVB,
//! ATSC, ISDB) along the way.
//!
//! ## Scope
//!
//! This crate implements the demultiplexer core only: byte-alignment
//! recovery, PID routing, PSI section reassembly and parsing, and PES
//! boundary detection. It deliberately does **not** decode elementary
//! streams, normalize timestamps beyond capturing raw PCR/PTS/DTS ticks,
//! descramble, remux, perform I/O, or own an event loop — those are the
//! concerns of whatever application embeds a [`ts::Demux`].
//!
//! ## Quick start
//!
//! ```rust
//! use mpegts_demux::pipe::Pipe;
//! use mpegts_demux::ts::conformance::ConformanceSetting;
//! use mpegts_demux::ts::Demux;
//! use mpegts_demux::uref::Uref;
//!
//! let mut demux = Demux::new(ConformanceSetting::Auto);
//! let flow_def = Uref::new_control();
//! flow_def.set_flow_def("block.mpegts.");
//! demux.input(flow_def);
//! assert!(demux.mode().is_some());
//! ```
//!
//! ## Module overview
//!
//! - [`uref`]: the reference-counted message unit that flows between pipes.
//! - [`pipe`]: the base pipe/probe abstraction every inner stage implements.
//! - [`ts`]: the TS-specific pipes (sync, split, decaps, PSI assembly and
//!   filtering, PAT/PMT decoding, PES reassembly) and the [`ts::Demux`]
//!   orchestrator that wires them together.
//! - [`error`]: the crate's error taxonomy.
//! - [`config`]: the one runtime-tunable constant (sync lock run length).
//! - [`utils`]: shared byte-level helpers (CRC-32/MPEG-2).

/// Error types and utilities.
pub mod error;

/// Reference-counted message units and their attribute/clock metadata.
pub mod uref;

/// Base pipe/probe abstraction shared by every inner stage.
pub mod pipe;

/// MPEG Transport Stream demultiplexing pipes and orchestrator.
pub mod ts;

/// Common utilities and helper functions.
pub mod utils;

/// Configuration module.
pub mod config;

pub use error::{DemuxError, Result};
