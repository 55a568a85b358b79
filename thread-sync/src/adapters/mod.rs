pub mod remote;
pub mod sqlite;
