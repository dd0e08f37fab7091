pub mod config;
pub mod database;
pub mod record_store;
pub mod work_queue;

pub use config::DatabaseConfig;
pub use database::Database;
pub use record_store::PgRecordStore;
pub use work_queue::PgWorkQueue;
