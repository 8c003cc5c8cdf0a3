//! Chat and speech backends for AeNKI.
//!
//! Chat backends implement `aenki_core::Provider`, speech backends
//! implement `aenki_core::SpeechSynthesizer`. The router assembles both
//! into fallback chains that end in a simulation.

pub mod fallback;
pub mod google_tts;
pub mod openai_compat;
pub mod router;
pub mod simulated;

pub use fallback::{FallbackProvider, FallbackSynthesizer};
pub use google_tts::GoogleTtsSynthesizer;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_chat_from_config, build_speech_from_config};
pub use simulated::{SIMULATION, SimulatedProvider, SimulatedSynthesizer};
