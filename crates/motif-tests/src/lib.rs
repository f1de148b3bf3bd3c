//! Integration test crate for Motif.
//!
//! This crate exists solely to hold cross-crate integration tests. Every
//! scenario runs on the software backend, so no GPU is required.

#[cfg(test)]
mod common;

#[cfg(test)]
mod programs;

#[cfg(test)]
mod compositing;

#[cfg(test)]
mod filters;

#[cfg(test)]
mod device;
