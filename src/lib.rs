pub mod config;
pub mod convert;
pub mod library;
pub mod models;
pub mod parser;
pub mod report;
pub mod web;
