pub mod client_ip;
pub mod error;
pub mod handlers;
pub mod middleware;
