pub mod card;
pub mod config;
pub mod lesson;
pub mod review;
pub mod sm2;
pub mod store;
pub mod web;
