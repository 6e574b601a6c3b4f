// Open-loop driver for a quadruped robot dog controlled by a TCP line protocol
pub mod base;
pub mod config;
pub mod messages;
pub mod runtime;
pub mod simulator;
pub mod teleop;
