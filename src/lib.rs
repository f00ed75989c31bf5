pub mod batch;
pub mod bounds;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod in_memory;
pub mod json_stream;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod sanitize;
pub mod sink;
pub mod staging;
pub mod strategy;
pub mod streaming;
pub mod transform;
