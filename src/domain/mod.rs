pub mod lifecycle;
pub mod models;
pub mod pairs;
pub mod password;
pub mod period;
pub mod scoring;
pub mod stats;
