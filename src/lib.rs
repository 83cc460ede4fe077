//! Farm data backend: reference data (farm types, crops), farmer records and
//! offline sync for mobile clerks, served over a JSON API.

pub mod config;
pub mod db;
pub mod models;
pub mod server;
