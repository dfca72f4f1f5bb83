pub mod constants;
pub mod decoder;
pub mod matcher;
pub mod models;
pub mod presence;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod transport;
pub mod types;
