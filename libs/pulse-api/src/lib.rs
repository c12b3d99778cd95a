pub mod error;
pub mod ingest;
pub mod record;
pub mod storage;
pub mod util;
