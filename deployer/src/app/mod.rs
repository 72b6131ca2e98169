//! Daemon wiring

pub mod run;
