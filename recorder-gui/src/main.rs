//! # Rolling Recorder - Live Waveform and Spectrum GUI
//!
//! This module contains the main GUI application for the rolling recorder.
//! It shows the last N seconds of microphone audio together with its
//! magnitude spectrum, and saves or uploads the window on demand.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Session Worker**: `recorder_core::SessionController` captures and analyzes off the UI thread
//! - **Communication**: Crossbeam channel of analysis frames, drained every tick
//! - **Uploads**: Async tasks on iced's tokio executor, never blocking the UI
//! - **Updates**: 60 FPS continuous updates via subscription system

mod ui;
mod widgets;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use crossbeam_channel::Receiver;
use iced::{self, Element, Subscription, Task, Theme};
use log::{error, info, warn};
use recorder_core::{
    audio, export, AnalysisFrame, AppConfig, CpalSource, RecorderError, SessionController, SessionState,
    UploadReceipt, Uploader,
};
use ui::main_display::create_main_view;

/// Config file looked up in the working directory at startup.
const CONFIG_FILE: &str = "recorder.json";

/// Main entry point for the recorder application.
///
/// Initializes logging and the Iced GUI application with dark theme and
/// continuous updates for smooth visualization.
pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("[MAIN] Starting recorder application...");
    let result = iced::application("Audio Recorder with Real-Time FFT", RecorderApp::update, RecorderApp::view)
        .subscription(RecorderApp::subscription)
        .theme(RecorderApp::theme)
        .run();
    info!("[MAIN] Application finished with result: {:?}", result);
    result
}

/// Application message types for the Iced GUI framework.
#[derive(Debug, Clone)]
pub enum Message {
    FileNameChanged(String),

    StartRecording,
    StopRecording,
    SaveAudio,
    UploadAudio,

    /// Result of a background upload, already rendered for the status line.
    UploadFinished(Result<UploadReceipt, String>),

    // Continuous update message
    Tick,
}

/// UI-specific data needed for rendering the interface.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub session_state: SessionState,
    pub file_name: String,
    pub status: String,
    pub last_frame: Option<Arc<AnalysisFrame>>,
    pub duration_secs: u32,
    pub max_frequency: f32,
    pub upload_in_flight: bool,
    /// False when the session could not be created at all.
    pub session_available: bool,
}

/// Main application state.
struct RecorderApp {
    session: Option<SessionController>,
    frames: Option<Receiver<Arc<AnalysisFrame>>>,
    uploader: Option<Uploader>,
    output_dir: PathBuf,

    // Single source of truth for all display data
    display_data: AppDisplayData,
}

impl Default for RecorderApp {
    /// Loads `recorder.json` (or defaults) and creates an idle session on the
    /// default input device. Failures are shown in the status line instead of
    /// aborting the application.
    fn default() -> Self {
        info!("[MAIN] Creating RecorderApp...");
        let config = match AppConfig::load_or_default(CONFIG_FILE) {
            Ok(config) => config,
            Err(e) => {
                warn!("[MAIN] Ignoring {}: {}", CONFIG_FILE, e);
                let mut config = AppConfig::default();
                config.upload.apply_env();
                config
            }
        };

        let mut status = "Status: Ready".to_string();

        match audio::list_input_devices() {
            Ok(devices) => info!("[MAIN] Input devices: {:?}", devices),
            Err(e) => warn!("[MAIN] Could not list input devices: {}", e),
        }
        let source = match &config.input_device {
            Some(name) => CpalSource::named(name.as_str()),
            None => CpalSource::default_device(),
        };

        let session = match SessionController::new(config.capture.clone(), Box::new(source)) {
            Ok(session) => Some(session),
            Err(e) => {
                error!("[MAIN] Could not create session: {}", e);
                status = format!("Status: {}", e);
                None
            }
        };
        let frames = session.as_ref().map(|s| s.subscribe());

        let uploader = match Uploader::new(config.upload.clone()) {
            Ok(uploader) => Some(uploader),
            Err(e) => {
                error!("[MAIN] Upload client unavailable: {}", e);
                None
            }
        };

        Self {
            display_data: AppDisplayData {
                session_state: SessionState::Idle,
                file_name: String::new(),
                status,
                last_frame: None,
                duration_secs: config.capture.duration_secs,
                max_frequency: config.capture.max_frequency.min(config.capture.nyquist()),
                upload_in_flight: false,
                session_available: session.is_some(),
            },
            session,
            frames,
            uploader,
            output_dir: config.output_dir,
        }
    }
}

impl RecorderApp {
    /// Handles application state updates based on incoming messages.
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::FileNameChanged(name) => {
                self.display_data.file_name = name;
            }
            Message::StartRecording => {
                if let Some(session) = self.session.as_mut() {
                    match session.start() {
                        Ok(()) => self.display_data.status = "Status: Recording...".to_string(),
                        Err(e) => {
                            error!("[MAIN] Failed to start recording: {}", e);
                            self.display_data.status = format!("Status: {}", e);
                        }
                    }
                    self.display_data.session_state = session.state();
                }
            }
            Message::StopRecording => {
                if let Some(session) = self.session.as_mut() {
                    session.stop();
                    self.display_data.session_state = session.state();
                    self.display_data.status = "Status: Recording Stopped".to_string();
                }
            }
            Message::SaveAudio => {
                if let Err(e) = self.save_audio() {
                    error!("[MAIN] Error saving audio: {:#}", e);
                    self.display_data.status = format!("Status: Save failed: {:#}", e);
                }
            }
            Message::UploadAudio => {
                return self.upload_audio();
            }
            Message::UploadFinished(result) => {
                self.display_data.upload_in_flight = false;
                self.display_data.status = match result {
                    Ok(receipt) => format!("Status: Uploaded {} successfully!", receipt.file_name),
                    Err(message) => format!("Status: {}", message),
                };
            }
            Message::Tick => {
                self.drain_frames();
            }
        }
        Task::none()
    }

    /// Pulls every frame published since the last tick and keeps the newest.
    fn drain_frames(&mut self) {
        if let Some(receiver) = &self.frames {
            if let Some(frame) = receiver.try_iter().last() {
                self.display_data.last_frame = Some(frame);
            }
        }

        if let Some(session) = self.session.as_mut() {
            let was_recording = self.display_data.session_state == SessionState::Recording;
            let state = session.poll();
            if was_recording && state == SessionState::Stopped {
                let reason = session
                    .stats()
                    .last_fault
                    .map(|fault| fault.to_string())
                    .unwrap_or_else(|| "audio stream ended".to_string());
                self.display_data.status = format!("Status: Recording stopped: {}", reason);
            }
            self.display_data.session_state = state;
        }
    }

    /// Writes the current window to `<output_dir>/<name>.wav` and returns the path.
    fn save_audio(&mut self) -> anyhow::Result<PathBuf> {
        let session = self.session.as_ref().context("no audio session")?;
        let path = export::resolve_export_path(&self.output_dir, &self.display_data.file_name);
        let samples = session.current_buffer();

        if !session.has_signal() {
            warn!("[MAIN] Buffer is silent; writing an all-zero file");
        }
        export::export_wav(&samples, session.sample_rate(), &path)
            .with_context(|| format!("writing {}", path.display()))?;

        self.display_data.status = format!("Status: Audio saved to {}", path.display());
        Ok(path)
    }

    /// Saves the window, then posts it in the background.
    fn upload_audio(&mut self) -> Task<Message> {
        if self.display_data.upload_in_flight {
            return Task::none();
        }
        let Some(uploader) = self.uploader.clone() else {
            self.display_data.status = "Status: Upload client unavailable".to_string();
            return Task::none();
        };
        let path = match self.save_audio() {
            Ok(path) => path,
            Err(e) => {
                error!("[MAIN] Error saving audio before upload: {:#}", e);
                self.display_data.status = format!("Status: Save failed: {:#}", e);
                return Task::none();
            }
        };

        self.display_data.upload_in_flight = true;
        self.display_data.status = format!(
            "Status: Uploading {} as '{}'...",
            path.display(),
            uploader.config().label
        );
        Task::perform(upload(uploader, path), Message::UploadFinished)
    }

    /// Renders the main application interface.
    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    /// Creates a subscription for continuous application updates.
    ///
    /// Returns a timer subscription that fires every 16ms (60 FPS).
    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Runs one upload and renders failures the way the status line shows them.
async fn upload(uploader: Uploader, path: PathBuf) -> Result<UploadReceipt, String> {
    uploader
        .upload(&path, None)
        .await
        .map_err(|e| describe_upload_error(&path, e))
}

fn describe_upload_error(path: &Path, err: RecorderError) -> String {
    match err {
        RecorderError::UploadRejected { status, body } => {
            format!("Upload failed with status code: {}\nResponse: {}", status, body)
        }
        RecorderError::UploadTransport(detail) => format!("Upload error occurred: {}", detail),
        other => format!("Upload of {} failed: {}", path.display(), other),
    }
}
