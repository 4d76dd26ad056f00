//! # spoco
//!
//! Monitor and control for the 12-input SNAP "pocket correlator", including
//! capture of accumulated visibility spectra to disk. The gateware is talked to
//! over KATCP (via the [`katcp`] crate), registers are modeled with
//! [`packed_struct`], and visibility batches land on disk as npz archives.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod acquisition;
pub mod archive;
pub mod baseline;
pub mod core;
pub mod correlator;
pub mod prelude;
pub mod transport;
