#![no_std]
#![cfg_attr(docs_rs, feature(doc_cfg))]
#![warn(missing_debug_implementations)]

//! Push-mode PNG decoding and encoding.
//!
//! * [`push::ReadSession`] reads a PNG from byte pieces of any size and hands
//!   each row to a [`push::PushHandler`] as soon as it is complete.
//! * Rows pass through a chain of transforms (expansion, gamma, composition,
//!   channel shuffles, packing) registered with the `set_*` methods of the
//!   session. Runs of transforms on small pixels are folded into lookup
//!   tables, and palette images have the transforms applied to the palette
//!   instead of every pixel.
//! * [`write::PngWriter`] does the reverse, running the invertible
//!   transforms backwards.
//! * [`decode::decode_to_vec`] decodes a whole file held in memory.

extern crate alloc;

#[cfg(target_pointer_width = "16")]
compile_error!("this crate assumes 32-bit or bigger pointers!");

pub mod chunk;
pub mod chunks;
pub mod config;
mod crc32;
pub mod decode;
pub mod error;
pub mod ihdr;
mod inflate;
pub mod info;
pub mod interlace;
pub mod push;
pub mod row;
pub mod sample;
mod transform;
pub mod unfilter;
pub mod write;

pub use crate::{
  config::{CrcAction, DecoderConfig, EncoderConfig, FilterChoice},
  decode::{decode_to_vec, DecodedImage},
  error::{AppError, PngError, PngWarning, WarningKind},
  info::ImageInfo,
  push::{Control, FillerPosition, PushHandler, ReadSession},
  transform::{AlphaMode, BackgroundColor, BackgroundGamma, ErrorAction, TrueBits},
  write::PngWriter,
};
