//! Multi-node simulation for the TSCH MAC

pub mod aether;
pub mod run;
