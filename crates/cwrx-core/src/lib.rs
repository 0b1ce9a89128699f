//! # CW Receiver Core
//!
//! Realtime decoder for CW (Morse code) buried in audio: an
//! amplitude-keyed tone is tracked, demodulated, binarized, timed, and
//! turned back into text.
//!
//! ## Signal Flow
//!
//! ```text
//! audio ──► SDR demod (I/Q mix + LPF + AFC) ──► envelope
//!   │                                              │
//!   └──► spectrum monitor (Welch, background)      ▼
//!               │ tracked freq          adaptive threshold
//!               └────────► retune              │
//!                                              ▼
//!                               Schmitt trigger + debounce
//!                                              │ mark/space durations
//!                                              ▼
//!                               symbol buffer (stitch, WPM, normalize)
//!                                              │ pulse vectors
//!                                              ▼
//!                               beam search + bigram language model
//!                                              │
//!                                              ▼ decoded text
//! ```
//!
//! Every stage is usable on its own; [`pipeline::CwPipeline`] wires the
//! full chain behind a push interface.
//!
//! ## Example
//!
//! ```rust
//! use cwrx_core::{CwConfig, CwPipeline, LanguageModel};
//!
//! let mut cfg = CwConfig::default();
//! cfg.monitor.enabled = false; // no background worker in this example
//!
//! let mut pipeline = CwPipeline::new(
//!     cfg,
//!     LanguageModel::empty(),
//!     |text| print!("{}", text),
//! ).unwrap();
//!
//! // Feed mono f32 samples as they arrive; flush at end of stream.
//! pipeline.process_chunk(&[0.0f32; 1024]);
//! let decoded = pipeline.finish();
//! assert_eq!(decoded, "");
//! ```

pub mod afc;
pub mod beam;
pub mod cluster;
pub mod config;
pub mod fft_utils;
pub mod filters;
pub mod goertzel;
pub mod history;
pub mod lang_model;
pub mod monitor;
pub mod morse;
pub mod pipeline;
pub mod sdr;
pub mod stats;
pub mod symbol;
pub mod synth;
pub mod thresholder;
pub mod trigger;
pub mod types;

pub use config::CwConfig;
pub use lang_model::LanguageModel;
pub use pipeline::{CwPipeline, TextDecoder};
pub use types::{CwError, CwResult, SignalState, StateTransition};
