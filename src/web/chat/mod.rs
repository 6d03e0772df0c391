pub mod constants;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod messages;
pub mod prompts;
pub mod retry;
pub mod stream_processor;
pub mod tools;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use handlers::router;
