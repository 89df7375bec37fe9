//! # UI Module
//!
//! This module contains the layout of the recorder window.

pub mod main_display;
