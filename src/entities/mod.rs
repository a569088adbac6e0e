pub mod prelude;

pub mod users;

pub use users::{Model as User, Role};
