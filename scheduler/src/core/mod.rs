pub mod accounts;
pub mod bit_window;
pub mod charge_gas;
pub mod context;
pub mod dag_verifier;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod gas;
pub mod provider;
pub mod scheduler;
pub mod sender_collection;
pub mod sender_group;
pub mod snapshot;
pub mod worker_pool;

#[cfg(test)]
mod test_utils;
