//! Decoding of LSF base library query results.
//!
//! Results of `liblsf` calls are fixed C structures holding pointers to
//! variable-length arrays whose sizes live in sibling count fields. This
//! crate reads them through a [`decoder::NativeMemory`], following a
//! pointer only after its count says there is something behind it, and
//! hands back owned views.
//!
//! ```no_run
//! use lsfview::config::DecoderConfig;
//! use lsfview::surface::{Session, SnapshotSurface};
//!
//! let surface = SnapshotSurface::open("capture.json".as_ref())?;
//! let session = Session::new(Box::new(surface), DecoderConfig::default());
//! for host in session.hosts(None, vec![], 0)? {
//!     match host {
//!         Ok(host) => println!("{} {:?}", host.name, host.resources),
//!         Err(err) => eprintln!("skipped: {err}"),
//!     }
//! }
//! # Ok::<(), lsfview::error::Error>(())
//! ```

#![cfg_attr(not(feature = "liblsf"), forbid(unsafe_code))]

pub mod config;
pub mod decoder;
pub mod error;
pub mod formatter;
pub mod status;
pub mod surface;
pub mod views;

#[cfg(test)]
mod testutil;
