//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a sitemap and record pages and run
//! whole batches end-to-end against SQLite.

mod batch_tests;
