// SPDX-License-Identifier: Apache-2.0

pub mod watermark_file;

pub use watermark_file::FileWatermarkBackend;
