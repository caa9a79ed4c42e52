// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use anyhow::{Context, bail};
use image::{ImageFormat, RgbaImage};
use rust_embed::RustEmbed;

pub const CALENDAR: &str = "calendar.png";
pub const DIGITS: &str = "digits.png";

#[derive(RustEmbed)]
#[folder = "icons/"]
struct Icons;

/// Loads a PNG from `path` if given, otherwise the built-in asset `name`.
pub fn load(name: &str, path: Option<&Path>) -> anyhow::Result<RgbaImage> {
    let data = match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => Icons::get(name)
            .with_context(|| format!("missing built-in icon {name}"))?
            .data
            .into_owned(),
    };

    decode(&data).with_context(|| format!("decoding {name}"))
}

fn decode(data: &[u8]) -> anyhow::Result<RgbaImage> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Png)?.into_rgba8();
    if image.width() > u32::from(u16::MAX) || image.height() > u32::from(u16::MAX) {
        bail!("image is {}x{}, larger than X11 allows", image.width(), image.height());
    }
    Ok(image)
}

/// X11 image dimensions; `load` guarantees they fit.
pub fn size(image: &RgbaImage) -> (u16, u16) {
    (image.width() as u16, image.height() as u16)
}
