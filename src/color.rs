//! Category color tokens.
//!
//! New categories without an explicit color get one from the palette. The
//! picker is injectable so callers that need reproducible colors (tests,
//! scripted imports) can swap the random default for a deterministic one.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

pub const CATEGORY_COLOR_PALETTE: [&str; 5] = ["red", "green", "yellow", "purple", "orange"];

pub fn color_label(color: &str) -> &'static str {
    match color.trim().to_ascii_lowercase().as_str() {
        "red" => "Red",
        "green" => "Green",
        "yellow" => "Yellow",
        "purple" => "Purple",
        "orange" => "Orange",
        _ => "Custom",
    }
}

pub trait ColorPicker: Send {
    /// Pick a color token for the next category.
    fn pick(&mut self) -> String;
}

/// Default picker: a randomly chosen palette entry per call.
#[derive(Debug, Default)]
pub struct RandomColorPicker {
    state: RandomState,
    calls: u64,
}

impl ColorPicker for RandomColorPicker {
    fn pick(&mut self) -> String {
        let mut hasher = self.state.build_hasher();
        hasher.write_u64(self.calls);
        self.calls = self.calls.wrapping_add(1);
        let idx = (hasher.finish() as usize) % CATEGORY_COLOR_PALETTE.len();
        CATEGORY_COLOR_PALETTE[idx].to_string()
    }
}

/// Deterministic picker: walks the palette in order.
#[derive(Debug, Default)]
pub struct CyclingColorPicker {
    next: usize,
}

impl ColorPicker for CyclingColorPicker {
    fn pick(&mut self) -> String {
        let color = CATEGORY_COLOR_PALETTE[self.next % CATEGORY_COLOR_PALETTE.len()];
        self.next += 1;
        color.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_picker_stays_in_palette() {
        let mut picker = RandomColorPicker::default();
        for _ in 0..50 {
            let color = picker.pick();
            assert!(CATEGORY_COLOR_PALETTE.contains(&color.as_str()));
        }
    }

    #[test]
    fn test_cycling_picker_is_deterministic() {
        let mut picker = CyclingColorPicker::default();
        let first: Vec<String> = (0..CATEGORY_COLOR_PALETTE.len()).map(|_| picker.pick()).collect();
        assert_eq!(
            first,
            CATEGORY_COLOR_PALETTE
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
        );
        assert_eq!(picker.pick(), CATEGORY_COLOR_PALETTE[0]);
    }

    #[test]
    fn test_color_label() {
        assert_eq!(color_label("red"), "Red");
        assert_eq!(color_label(" Purple "), "Purple");
        assert_eq!(color_label("#ff00ff"), "Custom");
    }
}
