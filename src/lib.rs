// Library for tests to access modules

pub mod config;
pub mod evaluator;
pub mod fetcher;
pub mod models;
pub mod poller;
pub mod version;
