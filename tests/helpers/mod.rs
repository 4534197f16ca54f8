pub mod app;

pub use app::{send, TestApp};
