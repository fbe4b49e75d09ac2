//! Command handlers.

pub(crate) mod audit;
pub(crate) mod config;
pub(crate) mod evidence;
pub(crate) mod keygen;
pub(crate) mod ledger;
