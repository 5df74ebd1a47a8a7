//! Key codes reported by `getch` and friends
//!
//! Printable keys report their Unicode scalar value, Ctrl+letter reports
//! the control character (`1..=26`). Keys without a character use the
//! curses numbering so existing key tables keep working.

pub const TAB: i64 = 9;
pub const ENTER: i64 = 10;
pub const ESCAPE: i64 = 27;
pub const BACKSPACE: i64 = 8;

pub const DOWN: i64 = 258;
pub const UP: i64 = 259;
pub const LEFT: i64 = 260;
pub const RIGHT: i64 = 261;
pub const HOME: i64 = 262;
/// `F(n)` is `F0 + n`
pub const F0: i64 = 264;
pub const DELETE: i64 = 330;
pub const INSERT: i64 = 331;
pub const PAGE_DOWN: i64 = 338;
pub const PAGE_UP: i64 = 339;
pub const BACK_TAB: i64 = 353;
pub const END: i64 = 360;

/// Code of function key `n`
pub fn function(n: u8) -> i64 {
    F0 + i64::from(n)
}
