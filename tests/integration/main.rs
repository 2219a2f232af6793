//! End-to-end tests against mock HTTP servers

mod crawl_tests;
mod polite_tests;
