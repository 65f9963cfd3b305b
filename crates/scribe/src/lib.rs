pub mod agent;
pub mod bridge;
pub mod cloud;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod review;
pub mod sse;
pub mod tools;
