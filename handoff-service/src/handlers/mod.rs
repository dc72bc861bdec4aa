pub mod app;
pub mod bridge;
pub mod export;
pub mod handoff;
pub mod pages;
