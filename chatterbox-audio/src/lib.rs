// Speech engines backing the chatterbox model controller

pub mod tts;

pub use tts::{CommandLineBackend, Engine, EngineConfig};
