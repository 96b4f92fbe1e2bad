pub mod browser_pool;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod export;
pub mod extractor;
pub mod logger;
pub mod page_driver;
pub mod record;
pub mod rejection_logger;
pub mod repair;
pub mod session;
pub mod wait;

pub use decoder::decode;
pub use extractor::{RecordExtractor, ResultNode};
pub use page_driver::{ChromePageDriver, PageDriver};
pub use record::{CandidateRecord, SENTINEL_NAME};
pub use repair::{repair, RepairOptions, RepairReport};
pub use session::{ExtractionSession, SessionOutcome};
