pub mod http_json;
pub mod reading_backfill_file;
pub mod reading_csv_file;

pub use http_json::HttpReadingSource;
pub use reading_backfill_file::ReadingBackfillFileSource;
pub use reading_csv_file::ReadingCsvFileSource;
