use crossterm::style::Color;

pub const TITLE: Color = Color::Rgb { r: 235, g: 240, b: 255 };
pub const HEADING: Color = Color::Rgb { r: 120, g: 160, b: 255 };
pub const SUB_AGENT: Color = Color::Rgb { r: 230, g: 90, b: 90 };
pub const SUCCESS: Color = Color::Rgb { r: 90, g: 200, b: 120 };
pub const WARNING: Color = Color::Rgb { r: 187, g: 94, b: 0 };
pub const ACCENT: Color = Color::Rgb { r: 61, g: 160, b: 160 };
pub const CODE: Color = Color::Rgb { r: 173, g: 173, b: 173 };
pub const FG_PRIMARY: Color = Color::Rgb { r: 190, g: 190, b: 190 };
pub const FG_DIM: Color = Color::Rgb { r: 128, g: 128, b: 128 };
