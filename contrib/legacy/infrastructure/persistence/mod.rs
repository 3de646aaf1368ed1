// Infrastructure - Data persistence
// SQLite database, message history, async writer task

pub mod database;
pub mod database_writer;
pub mod history;

pub use database::Database;
pub use database_writer::DatabaseWriter;
