//! # Widgets Module
//!
//! Canvas widgets for the waveform and spectrum panels.

pub mod spectrum;
pub mod waveform;

use std::ops::Range;

/// Splits `len` items into `columns` contiguous, non-empty ranges covering
/// all of them, one per pixel column. Yields fewer ranges when there are
/// fewer items than columns.
pub fn column_ranges(len: usize, columns: usize) -> impl Iterator<Item = Range<usize>> {
    let columns = columns.min(len);
    (0..columns).map(move |c| (c * len / columns)..((c + 1) * len / columns))
}
