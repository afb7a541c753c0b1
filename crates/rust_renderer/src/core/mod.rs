//! Core renderer configuration

pub mod config;
