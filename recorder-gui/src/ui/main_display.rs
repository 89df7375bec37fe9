//! # Main Display Module
//!
//! This module contains the main display components and layout logic
//! for the rolling recorder: the file name row, the transport buttons,
//! the status line and the waveform and spectrum panels.

use iced::widget::{button, column, container, row, text, text_input, Space};
use iced::{Alignment, Element, Length};
use recorder_core::SessionState;

use crate::widgets::{spectrum, waveform};

/// Creates the complete main application view
pub fn create_main_view(data: &crate::AppDisplayData) -> Element<'_, crate::Message> {
    let title = text("Audio Recorder with Real-Time FFT").size(28);

    let file_row = row![
        text("File name").size(14),
        text_input("Enter file name (without extension)", &data.file_name)
            .on_input(crate::Message::FileNameChanged)
            .padding(6)
            .width(Length::Fill),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let main_content = column![
        title,
        Space::with_height(10),
        file_row,
        create_controls(data),
        text(data.status.clone()).size(14),
        create_waveform_panel(data),
        create_spectrum_panel(data),
    ]
    .spacing(10)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Start, Stop, Save and Upload. Buttons without a valid action are disabled.
fn create_controls(data: &crate::AppDisplayData) -> Element<'static, crate::Message> {
    let recording = data.session_state == SessionState::Recording;
    let available = data.session_available;

    row![
        make_button("Start Recording", (available && !recording).then_some(crate::Message::StartRecording)),
        make_button("Stop Recording", recording.then_some(crate::Message::StopRecording)),
        make_button("Save Audio", available.then_some(crate::Message::SaveAudio)),
        make_button(
            if data.upload_in_flight { "Uploading..." } else { "Upload Audio" },
            (available && !data.upload_in_flight).then_some(crate::Message::UploadAudio),
        ),
    ]
    .spacing(8)
    .into()
}

fn make_button(label: &'static str, message: Option<crate::Message>) -> Element<'static, crate::Message> {
    let enabled = message.is_some();
    let mut widget = button(text(label).size(14)).padding([6, 10]).on_press_maybe(message);

    if !enabled {
        widget = widget.style(|_theme, _status| button::Style {
            background: Some(iced::Background::Color(iced::Color::from_rgb(0.3, 0.3, 0.3))),
            text_color: iced::Color::from_rgb(0.6, 0.6, 0.6),
            ..button::Style::default()
        });
    }
    widget.into()
}

/// Creates the time-domain panel for the current window.
fn create_waveform_panel(data: &crate::AppDisplayData) -> Element<'static, crate::Message> {
    let samples = data.last_frame.as_ref().map(|frame| frame.waveform.clone());

    let waveform_content = container(waveform::Waveform::new(samples, data.duration_secs).view())
        .width(Length::Fill)
        .height(Length::Fill);

    container(
        column![
            text("Waveform").size(18),
            Space::with_height(10),
            waveform_content
        ]
        .spacing(5)
        .padding(15),
    )
    .width(Length::Fill)
    .height(Length::Fixed(220.0))
    .into()
}

/// Creates the frequency-domain panel for the latest frame.
fn create_spectrum_panel(data: &crate::AppDisplayData) -> Element<'static, crate::Message> {
    let spectrum_content = container(
        spectrum::SpectrumPlot::new(data.last_frame.clone(), data.max_frequency).view(),
    )
    .width(Length::Fill)
    .height(Length::Fill);

    container(
        column![
            text("FFT of the Signal").size(18),
            Space::with_height(10),
            spectrum_content
        ]
        .spacing(5)
        .padding(15),
    )
    .width(Length::Fill)
    .height(Length::Fixed(260.0))
    .into()
}
