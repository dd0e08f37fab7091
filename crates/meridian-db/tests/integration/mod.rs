pub mod common;
mod record_store_tests;
mod work_queue_tests;
