//! Remote interaction layer: the relay client, prompt construction, the
//! consultation pipeline and tolerant output parsing.

pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod relay_client;

pub use extract::{ElementalExtraction, parse_extraction};
pub use pipeline::ConsultPipeline;
pub use prompts::TranslationDirection;
pub use relay_client::RelayClient;
