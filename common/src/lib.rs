#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod contract;
pub mod crypto;
