pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod transform;
pub mod warehouse;
pub mod window;
