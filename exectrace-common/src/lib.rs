#![cfg_attr(target_arch = "bpf", no_std)]

pub mod macros;

pub mod consts;
pub mod flags;
pub mod string;

pub mod channel;
pub mod records;
pub mod snapshot;

pub mod path;
pub mod session;
pub mod streams;
