//! Built-in themes for wavescope
//!
//! Each theme is a base palette plus the colour used for the playhead. Everything
//! else is derived by [`Theme::apply_global_as_default`].

use crate::tui::{GlobalTheme, Theme};
use ratatui::style::Color;

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb(r, g, b)
}

fn themed(background: Color, foreground: Color, highlight: Color, playhead: Color) -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background,
            foreground,
            highlight: Some(highlight),
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme.playhead = playhead;
    theme
}

/// Catppuccin Mocha, the default.
///
/// Based on [Catppuccin](https://github.com/catppuccin/catppuccin)
pub fn catppuccin_mocha() -> Theme {
    themed(
        rgb(30, 30, 46),    // #1e1e2e
        rgb(205, 214, 244), // #cdd6f4
        rgb(203, 166, 247), // #cba6f7 (mauve)
        rgb(243, 139, 168), // #f38ba8 (red)
    )
}

/// Catppuccin Latte, the light flavour.
pub fn catppuccin_latte() -> Theme {
    themed(
        rgb(239, 241, 245), // #eff1f5
        rgb(76, 79, 105),   // #4c4f69
        rgb(136, 57, 239),  // #8839ef (mauve)
        rgb(210, 15, 57),   // #d20f39 (red)
    )
}

pub fn dracula() -> Theme {
    themed(
        rgb(40, 42, 54),    // #282a36
        rgb(248, 248, 242), // #f8f8f2
        rgb(189, 147, 249), // #bd93f9 (purple)
        rgb(255, 85, 85),   // #ff5555
    )
}

pub fn gruvbox_dark() -> Theme {
    themed(
        rgb(40, 40, 40),    // #282828
        rgb(235, 219, 178), // #ebdbb2
        rgb(250, 189, 47),  // #fabd2f (yellow)
        rgb(251, 73, 52),   // #fb4934
    )
}

pub fn nord() -> Theme {
    themed(
        rgb(46, 52, 64),    // #2e3440
        rgb(216, 222, 233), // #d8dee9
        rgb(136, 192, 208), // #88c0d0 (frost)
        rgb(191, 97, 106),  // #bf616a
    )
}

pub fn tokyo_night() -> Theme {
    themed(
        rgb(26, 27, 38),    // #1a1b26
        rgb(192, 202, 245), // #c0caf5
        rgb(122, 162, 247), // #7aa2f7 (blue)
        rgb(247, 118, 142), // #f7768e
    )
}

/// Plain monochrome for terminals without truecolor.
pub fn black_white_dark() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: Color::Black,
            foreground: Color::White,
            highlight: None,
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

const THEMES: &[(&str, fn() -> Theme)] = &[
    ("Black & White", black_white_dark),
    ("Catppuccin Latte", catppuccin_latte),
    ("Catppuccin Mocha", catppuccin_mocha),
    ("Dracula", dracula),
    ("Gruvbox Dark", gruvbox_dark),
    ("Nord", nord),
    ("Tokyo Night", tokyo_night),
];

/// Get a theme by name
///
/// Returns `None` if the theme name is not recognized. Matching ignores case.
pub fn get_by_name(name: &str) -> Option<Theme> {
    THEMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, theme)| theme())
}

/// Get a list of all available theme names
pub fn list_themes() -> impl Iterator<Item = &'static str> {
    THEMES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_theme_resolves() {
        for name in list_themes() {
            assert!(get_by_name(name).is_some(), "{name}");
        }
        assert_eq!(get_by_name("nord"), Some(nord()));
        assert_eq!(get_by_name("Solarized Dark"), None);
    }

    #[test]
    fn playhead_stands_out_from_the_waveform() {
        let theme = catppuccin_mocha();
        assert_eq!(theme.waveform, rgb(205, 214, 244));
        assert_eq!(theme.playhead, rgb(243, 139, 168));
        assert_ne!(theme.playhead, theme.waveform);
    }
}
