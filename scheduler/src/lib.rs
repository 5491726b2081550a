#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod config;
pub mod core;

pub use crate::core::{
    error::SchedulerError,
    scheduler::{ScheduleOutput, TxScheduler, VerifyOutput},
};
