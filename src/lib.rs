pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod matching;
pub mod mirror;
pub mod model;
pub mod reconcile;
pub mod workflow;
pub mod yodeck;
