pub mod ingestion;
pub mod notifications;
pub mod system;
