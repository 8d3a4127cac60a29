pub mod classifier;
pub mod fs_service;
pub mod pipeline;
pub mod suggestion_service;
