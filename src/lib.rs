//! Terminal client for the Crewmind Assistant question/answer service

pub mod api;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logging;
pub mod ui;

#[cfg(test)]
mod test_support;
