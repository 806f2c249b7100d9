pub mod config;
pub mod context;
pub mod debug_dump;
pub mod fs_names;
pub mod logging;
