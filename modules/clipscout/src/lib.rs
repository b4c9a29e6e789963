pub mod crawl;
pub mod curator;
pub mod diversity;
pub mod expansion;
pub mod export;
pub mod filter;
pub mod retry;
pub mod run;
pub mod scoring;
pub mod scraper;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
