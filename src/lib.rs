#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod backend;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod create;
pub mod error;
pub mod locate;
pub mod logging;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod vmx;
