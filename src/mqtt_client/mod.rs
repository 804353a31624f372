pub mod client;
pub mod exporter;
pub mod fun_with_tls;
pub mod models;
