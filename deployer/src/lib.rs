//! Swarm Deployer Library
//!
//! Deployment engine for running projects as Docker Swarm services: stack
//! retargeting, service reconciliation, project logs and removal.

pub mod app;
pub mod bootstrap;
pub mod cluster;
pub mod compose;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod labels;
pub mod logs;
pub mod project;
pub mod server;
pub mod storage;
pub mod utils;
