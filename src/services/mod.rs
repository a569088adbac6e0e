pub mod credential_store;
pub mod file_service;
pub mod login_throttle;
pub mod path_resolver;
pub mod session;
pub mod worker;
