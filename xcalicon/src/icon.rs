// SPDX-License-Identifier: GPL-3.0-only

//! Where the day-of-month digits go on the calendar artwork.

/// Top edge of the digits on the calendar page.
pub const DIGIT_Y: i16 = 28;
/// Left edge of a lone digit (days 1 to 9).
pub const SINGLE_X: i16 = 26;
/// Left edges of the tens and ones digits (days 10 to 31).
pub const TENS_X: i16 = 19;
pub const ONES_X: i16 = 33;

/// A rectangular copy from the digit strip onto the icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blit {
    pub src_x: i16,
    pub src_y: i16,
    pub width: u16,
    pub height: u16,
    pub dst_x: i16,
    pub dst_y: i16,
}

/// Size of the digit strip, which holds the glyphs 0 to 9 left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitStrip {
    pub width: u16,
    pub height: u16,
}

impl DigitStrip {
    pub fn glyph_width(&self) -> u16 {
        self.width / 10
    }

    fn glyph(&self, digit: u32, dst_x: i16) -> Blit {
        let width = self.glyph_width();
        Blit {
            src_x: (width as u32 * digit) as i16,
            src_y: 0,
            width,
            height: self.height,
            dst_x,
            dst_y: DIGIT_Y,
        }
    }
}

/// Copies that paint `day` onto a fresh calendar page.
pub fn digit_blits(day: u32, strip: DigitStrip) -> Vec<Blit> {
    debug_assert!(day < 100);

    if day >= 10 {
        vec![
            strip.glyph(day / 10, TENS_X),
            strip.glyph(day % 10, ONES_X),
        ]
    } else {
        vec![strip.glyph(day, SINGLE_X)]
    }
}

/// Origin that centers an `inner` sized image inside `outer`.
pub fn centered(outer: (u16, u16), inner: (u16, u16)) -> (i16, i16) {
    (
        (outer.0 / 2) as i16 - (inner.0 / 2) as i16,
        (outer.1 / 2) as i16 - (inner.1 / 2) as i16,
    )
}
