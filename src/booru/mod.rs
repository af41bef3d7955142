//! Tag-search downloader for booru-style JSON index endpoints

pub mod config_loader;
pub mod download_worker;
pub mod item_resolver;
pub mod logger;
pub mod page_fetcher;
pub mod pipeline;
pub mod run_folder;

// Re-export what the program flow needs
pub use config_loader::init_config;
pub use logger::init_logger;
pub use pipeline::{FetchRequest, Pipeline, RunSummary, StopReason};
pub use run_folder::create_run_folder;
