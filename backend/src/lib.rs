pub mod auth;
pub mod config;
pub mod imaging;
pub mod inference;
pub mod pages;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod storage;
