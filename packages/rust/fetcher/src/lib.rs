//! Page retrieval and extraction for byline sources.
//!
//! This crate provides:
//! - [`Fetcher`]: static (HTTP GET) and rendered (headless browser) fetches
//! - [`browser`]: the browser session seam and the local Chromium driver
//! - [`Politeness`]: randomized delay between successive requests
//! - [`Pagination`]: bounded, restartable listing-page iterator
//! - [`extract`]: the [`Extractor`] contract and a CSS-selector implementation
//! - [`TwitterClient`]: Twitter/X user search

pub mod browser;
pub mod engine;
pub mod extract;
pub mod pagination;
pub mod politeness;
pub mod twitter;

pub use browser::{BrowserLauncher, BrowserSession, ChromeLauncher};
pub use engine::{FetchedPage, Fetcher};
pub use extract::{Extractor, SelectorExtractor, classify_contact};
pub use pagination::Pagination;
pub use politeness::Politeness;
pub use twitter::{TwitterClient, TwitterUser, UserPage};
