//! # Kernel synchronization primitives
//!
//! The bootstrap path is single-threaded with interrupts masked; the only
//! shared state is set once during initialization and read afterwards.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod sync_once_cell;

pub use sync_once_cell::SyncOnceCell;
