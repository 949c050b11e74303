pub mod client;
pub mod config;
pub mod db;
pub mod domain;
pub mod middleware;
pub mod report;
pub mod state;
pub mod web;
