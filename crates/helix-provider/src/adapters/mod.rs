//! Concrete provider adapters.

pub mod openai;
pub mod subprocess;

pub use openai::OpenAiAdapter;
pub use subprocess::SubprocessAdapter;
