//! Core crate for the KPT processing dashboard: backend client, upload
//! selection, table/panel view models and the polling dashboard.

pub mod client;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod models;
pub mod panel;
pub mod table;
pub mod upload;
