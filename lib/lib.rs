pub mod api;
pub mod bot;
pub mod bridge;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod prediction;
pub mod server;
pub mod state;
pub mod storage;
pub mod telegram;
pub mod worker;

#[cfg(test)]
mod test_support;
