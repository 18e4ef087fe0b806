pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod response;
pub mod state;
pub mod storage;
pub mod uploads;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;
