// recorder-core/src/lib.rs

//! The core logic for the rolling audio recorder.
//! This crate captures microphone audio into a fixed-length rolling window,
//! keeps a magnitude spectrum of that window up to date, and hands finished
//! windows to the WAV exporter and the upload client. It is completely
//! headless and contains no GUI code.

pub mod audio;
pub mod buffer;
pub mod config;
pub mod error;
pub mod export;
pub mod fft;
pub mod session;
pub mod upload;

pub use audio::{BlockQueue, CaptureEvent, CaptureHandle, CpalSource, SampleSource};
pub use buffer::{AudioSnapshot, CircularAudioBuffer};
pub use config::{AppConfig, CaptureConfig, UploadConfig};
pub use error::{RecorderError, Result};
pub use fft::{SpectralAnalyzer, Spectrum};
pub use session::{AnalysisFrame, SessionController, SessionState, SessionStats};
pub use upload::{UploadReceipt, Uploader};
