// SPDX-License-Identifier: GPL-3.0-only

use std::os::fd::{AsRawFd, RawFd};

use anyhow::{Context, bail};
use image::{Rgba, RgbaImage};
use x11rb::connection::Connection;
use x11rb::image::Image;
use x11rb::properties::{WmHints, WmHintsState};
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeGCAux, ClientMessageEvent, ConnectionExt as _, CreateGCAux, CreateWindowAux,
    EventMask, Gcontext, Pixmap, PropMode, VisualClass, Visualtype, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::config::CalendarIconConfig;
use crate::icon::{DigitStrip, centered, digit_blits};
use crate::assets;

const WM_CLASS: &[u8] = b"xcalicon\0XCalicon\0";

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        UTF8_STRING,
        _NET_WM_NAME,
        _NET_WM_ICON_NAME,
    }
}

/// Name of the display we are about to connect to, for error messages.
pub fn display_name(requested: Option<&str>) -> String {
    requested
        .map(str::to_owned)
        .or_else(|| std::env::var("DISPLAY").ok())
        .unwrap_or_default()
}

/// What a window manager's `WM_DELETE_WINDOW` message for our window looks like.
#[derive(Debug, Clone, Copy)]
pub struct CloseRequest {
    pub window: Window,
    pub protocols: Atom,
    pub delete_window: Atom,
}

impl CloseRequest {
    pub fn matches(&self, event: &ClientMessageEvent) -> bool {
        event.window == self.window
            && event.format == 32
            && event.type_ == self.protocols
            && event.data.as_data32()[0] == self.delete_window
    }
}

/// The X server side of the applet: our window and every pixmap it draws from.
pub struct Display {
    conn: RustConnection,
    atoms: Atoms,
    window: Window,
    gc: Gcontext,
    hints: WmHints,
    calendar: Pixmap,
    calendar_mask: Pixmap,
    calendar_size: (u16, u16),
    digits: Pixmap,
    digit_strip: DigitStrip,
    icon: Pixmap,
}

impl Display {
    pub fn open(
        requested: Option<&str>,
        config: &CalendarIconConfig,
        calendar_png: &RgbaImage,
        digits_png: &RgbaImage,
    ) -> anyhow::Result<Self> {
        let (conn, screen_num) = x11rb::connect(requested)
            .with_context(|| format!("can't open display {}", display_name(requested)))?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let depth = screen.root_depth;
        let visual = root_visual(&conn, screen_num)?;
        let calendar_size = assets::size(calendar_png);
        let (digits_width, digits_height) = assets::size(digits_png);
        tracing::info!(screen = screen_num, root, depth, "connected to X server");

        let atoms = Atoms::new(&conn)?.reply()?;

        let window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            root,
            0,
            0,
            config.window_width,
            config.window_height,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .border_pixel(screen.black_pixel)
                .event_mask(EventMask::EXPOSURE),
        )?
        .check()
        .context("creating window")?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            WM_CLASS,
        )?
        .check()
        .context("setting WM_CLASS")?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &[atoms.WM_DELETE_WINDOW],
        )?
        .check()
        .context("setting WM_PROTOCOLS")?;

        let gc = conn.generate_id()?;
        conn.create_gc(
            gc,
            window,
            &CreateGCAux::new()
                .foreground(screen.black_pixel)
                .background(screen.white_pixel)
                .graphics_exposures(0),
        )?
        .check()
        .context("creating graphics context")?;

        let calendar = upload_color(&conn, root, gc, depth, &visual, calendar_png)
            .context("uploading calendar pixmap")?;
        let calendar_mask =
            upload_mask(&conn, root, calendar_png).context("uploading calendar mask")?;
        let digits = upload_color(&conn, root, gc, depth, &visual, digits_png)
            .context("uploading digits pixmap")?;

        let icon = conn.generate_id()?;
        conn.create_pixmap(depth, icon, root, calendar_size.0, calendar_size.1)?
            .check()
            .context("creating icon pixmap")?;

        let mut hints = WmHints::new();
        if config.start_iconic {
            hints.initial_state = Some(WmHintsState::Iconic);
        }

        Ok(Self {
            conn,
            atoms,
            window,
            gc,
            hints,
            calendar,
            calendar_mask,
            calendar_size,
            digits,
            digit_strip: DigitStrip {
                width: digits_width,
                height: digits_height,
            },
            icon,
        })
    }

    pub fn connection_fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }

    pub fn poll_for_event(&self) -> anyhow::Result<Option<Event>> {
        Ok(self.conn.poll_for_event()?)
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        Ok(self.conn.flush()?)
    }

    pub fn map(&self) -> anyhow::Result<()> {
        self.conn.map_window(self.window)?;
        Ok(())
    }

    pub fn close_request(&self) -> CloseRequest {
        CloseRequest {
            window: self.window,
            protocols: self.atoms.WM_PROTOCOLS,
            delete_window: self.atoms.WM_DELETE_WINDOW,
        }
    }

    /// Sets both the window and the icon name.
    pub fn set_title(&self, title: &str) -> anyhow::Result<()> {
        let latin1 = latin1(title);
        for (legacy, ewmh) in [
            (AtomEnum::WM_NAME, self.atoms._NET_WM_NAME),
            (AtomEnum::WM_ICON_NAME, self.atoms._NET_WM_ICON_NAME),
        ] {
            self.conn.change_property8(
                PropMode::REPLACE,
                self.window,
                legacy,
                AtomEnum::STRING,
                &latin1,
            )?;
            self.conn.change_property8(
                PropMode::REPLACE,
                self.window,
                ewmh,
                self.atoms.UTF8_STRING,
                title.as_bytes(),
            )?;
        }
        Ok(())
    }

    /// Rebuilds the icon pixmap for `day` and hands it to the window manager.
    pub fn compose_icon(&mut self, day: u32) -> anyhow::Result<()> {
        let (width, height) = self.calendar_size;
        self.conn
            .copy_area(self.calendar, self.icon, self.gc, 0, 0, 0, 0, width, height)?;

        for blit in digit_blits(day, self.digit_strip) {
            self.conn.copy_area(
                self.digits,
                self.icon,
                self.gc,
                blit.src_x,
                blit.src_y,
                blit.dst_x,
                blit.dst_y,
                blit.width,
                blit.height,
            )?;
        }

        self.hints.icon_pixmap = Some(self.icon);
        self.hints.icon_mask = Some(self.calendar_mask);
        self.hints.set(&self.conn, self.window)?;
        Ok(())
    }

    /// Paints the icon, masked, in the middle of the window.
    pub fn draw_window(&self) -> anyhow::Result<()> {
        let geometry = self.conn.get_geometry(self.window)?.reply()?;
        let (width, height) = self.calendar_size;
        let (x, y) = centered((geometry.width, geometry.height), self.calendar_size);

        self.conn.clear_area(false, self.window, 0, 0, 0, 0)?;
        self.conn.change_gc(
            self.gc,
            &ChangeGCAux::new()
                .clip_mask(self.calendar_mask)
                .clip_x_origin(i32::from(x))
                .clip_y_origin(i32::from(y)),
        )?;
        self.conn
            .copy_area(self.icon, self.window, self.gc, 0, 0, x, y, width, height)?;
        self.conn.change_gc(
            self.gc,
            &ChangeGCAux::new()
                .clip_mask(x11rb::NONE)
                .clip_x_origin(0)
                .clip_y_origin(0),
        )?;
        Ok(())
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        for pixmap in [self.calendar, self.calendar_mask, self.digits, self.icon] {
            let _ = self.conn.free_pixmap(pixmap);
        }
        let _ = self.conn.free_gc(self.gc);
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }
}

fn root_visual(conn: &RustConnection, screen_num: usize) -> anyhow::Result<Visualtype> {
    let screen = &conn.setup().roots[screen_num];
    let visual = screen
        .allowed_depths
        .iter()
        .filter(|depth| depth.depth == screen.root_depth)
        .flat_map(|depth| depth.visuals.iter())
        .find(|visual| visual.visual_id == screen.root_visual)
        .cloned()
        .context("root visual not found")?;

    check_visual(&visual)?;
    Ok(visual)
}

/// Pixels are packed straight from the channel masks, which is only right for TrueColor.
/// DirectColor would also need its colormap set up.
fn check_visual(visual: &Visualtype) -> anyhow::Result<()> {
    if visual.class != VisualClass::TRUE_COLOR {
        bail!("unsupported root visual class {:?}", visual.class);
    }
    Ok(())
}

fn upload_color(
    conn: &RustConnection,
    root: Window,
    gc: Gcontext,
    depth: u8,
    visual: &Visualtype,
    png: &RgbaImage,
) -> anyhow::Result<Pixmap> {
    let (width, height) = assets::size(png);
    let pixmap = conn.generate_id()?;
    conn.create_pixmap(depth, pixmap, root, width, height)?.check()?;

    let mut image = Image::allocate_native(width, height, depth, conn.setup())?;
    for (x, y, rgba) in png.enumerate_pixels() {
        image.put_pixel(x as u16, y as u16, encode_pixel(visual, rgba));
    }
    for cookie in image.put(conn, pixmap, gc, 0, 0)? {
        cookie.check()?;
    }
    Ok(pixmap)
}

fn upload_mask(conn: &RustConnection, root: Window, png: &RgbaImage) -> anyhow::Result<Pixmap> {
    let (width, height) = assets::size(png);
    let pixmap = conn.generate_id()?;
    conn.create_pixmap(1, pixmap, root, width, height)?.check()?;

    let gc = conn.generate_id()?;
    conn.create_gc(
        gc,
        pixmap,
        &CreateGCAux::new()
            .foreground(1)
            .background(0)
            .graphics_exposures(0),
    )?
    .check()?;

    let mut image = Image::allocate_native(width, height, 1, conn.setup())?;
    for (x, y, rgba) in png.enumerate_pixels() {
        image.put_pixel(x as u16, y as u16, mask_bit(rgba));
    }
    for cookie in image.put(conn, pixmap, gc, 0, 0)? {
        cookie.check()?;
    }
    conn.free_gc(gc)?;
    Ok(pixmap)
}

/// Any coverage at all keeps a pixel in the shape mask.
fn mask_bit(rgba: &Rgba<u8>) -> u32 {
    u32::from(rgba[3] > 0)
}

/// Packs a color into a pixel value for a TrueColor visual.
pub fn encode_pixel(visual: &Visualtype, rgba: &Rgba<u8>) -> u32 {
    let [r, g, b, _] = rgba.0;
    channel(r, visual.red_mask) | channel(g, visual.green_mask) | channel(b, visual.blue_mask)
}

fn channel(value: u8, mask: u32) -> u32 {
    if mask == 0 {
        return 0;
    }
    let bits = mask.count_ones();
    let shift = mask.trailing_zeros();
    let scaled = if bits >= 8 {
        u32::from(value) << (bits - 8)
    } else {
        u32::from(value) >> (8 - bits)
    };
    (scaled << shift) & mask
}

/// `STRING` properties are ISO 8859-1.
fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visual(red: u32, green: u32, blue: u32) -> Visualtype {
        Visualtype {
            visual_id: 0x21,
            class: VisualClass::TRUE_COLOR,
            bits_per_rgb_value: 8,
            colormap_entries: 256,
            red_mask: red,
            green_mask: green,
            blue_mask: blue,
        }
    }

    #[test]
    fn encodes_24_bit_true_color() {
        let v = visual(0xff0000, 0x00ff00, 0x0000ff);
        assert_eq!(encode_pixel(&v, &Rgba([0xC6, 0x28, 0x28, 255])), 0xC62828);
        assert_eq!(encode_pixel(&v, &Rgba([255, 255, 255, 255])), 0xffffff);
    }

    #[test]
    fn encodes_16_bit_true_color() {
        let v = visual(0xf800, 0x07e0, 0x001f);
        assert_eq!(encode_pixel(&v, &Rgba([255, 255, 255, 255])), 0xffff);
        assert_eq!(encode_pixel(&v, &Rgba([255, 0, 0, 255])), 0xf800);
        assert_eq!(encode_pixel(&v, &Rgba([0, 0x80, 0, 255])), 0x20 << 5);
    }

    #[test]
    fn encodes_30_bit_true_color() {
        let v = visual(0x3ff0_0000, 0x000f_fc00, 0x0000_03ff);
        assert_eq!(encode_pixel(&v, &Rgba([255, 0, 0, 255])), 0x3fc0_0000);
    }

    #[test]
    fn only_true_color_is_accepted() {
        let mut v = visual(0xff0000, 0x00ff00, 0x0000ff);
        assert!(check_visual(&v).is_ok());
        v.class = VisualClass::DIRECT_COLOR;
        assert!(check_visual(&v).is_err());
        v.class = VisualClass::PSEUDO_COLOR;
        assert!(check_visual(&v).is_err());
    }

    #[test]
    fn mask_follows_alpha() {
        assert_eq!(mask_bit(&Rgba([0, 0, 0, 0])), 0);
        assert_eq!(mask_bit(&Rgba([255, 255, 255, 0])), 0);
        assert_eq!(mask_bit(&Rgba([0, 0, 0, 1])), 1);
        assert_eq!(mask_bit(&Rgba([255, 255, 255, 255])), 1);

        let calendar = assets::load(assets::CALENDAR, None).unwrap();
        let covered = calendar.pixels().filter(|p| mask_bit(p) == 1).count();
        assert!(covered > 0 && covered < 64 * 64);
        assert_eq!(mask_bit(calendar.get_pixel(0, 0)), 0);
        assert_eq!(mask_bit(calendar.get_pixel(32, 40)), 1);
    }

    fn client_message(window: Window, type_: Atom, first: u32) -> ClientMessageEvent {
        ClientMessageEvent::new(32, window, type_, [first, 0, 0, 0, 0])
    }

    #[test]
    fn close_request_needs_window_type_and_atom() {
        let close = CloseRequest {
            window: 0x40_0001,
            protocols: 300,
            delete_window: 301,
        };
        assert!(close.matches(&client_message(0x40_0001, 300, 301)));
        assert!(!close.matches(&client_message(0x40_0002, 300, 301)));
        assert!(!close.matches(&client_message(0x40_0001, 299, 301)));
        assert!(!close.matches(&client_message(0x40_0001, 300, 302)));

        let mut wrong_format = client_message(0x40_0001, 300, 301);
        wrong_format.format = 8;
        assert!(!close.matches(&wrong_format));
    }

    #[test]
    fn titles_are_latin1_for_legacy_properties() {
        assert_eq!(latin1("Fri 14:05"), b"Fri 14:05");
        assert_eq!(latin1("Mär"), vec![b'M', 0xe4, b'r']);
        assert_eq!(latin1("火 14:05"), b"? 14:05");
    }

    #[test]
    fn display_name_prefers_request() {
        assert_eq!(display_name(Some(":3")), ":3");
    }
}
