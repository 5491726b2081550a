#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::type_complexity)]

pub mod block;
pub mod chain_config;
pub mod config;
pub mod crypto;
pub mod dag;
pub mod error;
pub mod rwset;
pub mod transaction;
