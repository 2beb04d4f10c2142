/// CSV and JSON result export.
pub mod export;
