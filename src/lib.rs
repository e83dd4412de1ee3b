pub mod align;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod loader;
pub mod models;
pub mod outlier;
pub mod output;
pub mod pipeline;
pub mod split;
pub mod summary;
