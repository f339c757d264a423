pub mod annotation;
pub mod badge;
pub mod cli;
pub mod config;
pub mod diff;
pub mod diff_coverage;
pub mod error;
pub mod github;
pub mod groups;
pub mod ingest;
pub mod model;
pub mod parsers;
pub mod report;
