//! MySQL/MariaDB driver implementation

mod connection;
mod driver;

pub use connection::{MySqlConnection, build_opts};
pub use driver::MySqlDriver;
