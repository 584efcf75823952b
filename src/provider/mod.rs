pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAiCompatProvider;
pub use traits::*;
