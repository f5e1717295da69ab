// SPDX-License-Identifier: Apache-2.0

//! # provenance-std
//!
//! `std`-only storage backends for `provenance-core`.
//!
//! This crate provides [`FileWatermarkBackend`], a JSON file-backed
//! implementation of [`provenance_core::watermark::WatermarkBackend`]
//! suitable for CLI tools, local agents, and server-side deployments that
//! do not need a full database.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provenance_std::storage::FileWatermarkBackend;
//! use provenance_core::watermark::WatermarkStore;
//!
//! let backend = FileWatermarkBackend::open("/var/lib/agent/.provenance/watermarks.json")
//!     .expect("failed to open watermark file");
//!
//! let store = WatermarkStore::new(backend);
//! ```

pub mod storage;

pub use storage::watermark_file::FileWatermarkBackend;
