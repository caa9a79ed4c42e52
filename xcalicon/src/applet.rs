// SPDX-License-Identifier: GPL-3.0-only

use std::os::fd::{AsRawFd, RawFd};

use chrono::Datelike;
use anyhow::anyhow;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time;
use x11rb::protocol::Event;

use crate::assets;
use crate::clock::{RedrawState, TitleFormat};
use crate::config::CalendarIconConfig;
use crate::display::{CloseRequest, Display};

/// Borrowed view of the X connection's socket for the reactor. Never closes it.
struct XSocket(RawFd);

impl AsRawFd for XSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Ignore,
    Repaint,
    Close,
}

/// Decides what an X event means for the applet. Protocol errors are fatal.
fn classify(event: &Event, close: CloseRequest) -> anyhow::Result<Action> {
    let action = match event {
        // only the last of a series of exposures
        Event::Expose(expose) if expose.count == 0 => Action::Repaint,
        Event::ClientMessage(message) if close.matches(message) => Action::Close,
        Event::Error(err) => return Err(anyhow!("X11 request failed: {err:?}")),
        _ => Action::Ignore,
    };
    Ok(action)
}

pub struct Applet {
    display: Display,
    state: RedrawState,
    title: TitleFormat,
    config: CalendarIconConfig,
}

impl Applet {
    pub fn new(
        requested_display: Option<&str>,
        config: CalendarIconConfig,
    ) -> anyhow::Result<Self> {
        let calendar = assets::load(assets::CALENDAR, config.calendar_png.as_deref())?;
        let digits = assets::load(assets::DIGITS, config.digits_png.as_deref())?;
        let display = Display::open(requested_display, &config, &calendar, &digits)?;

        Ok(Self {
            display,
            state: RedrawState::default(),
            title: TitleFormat::new(config.title_format.clone()),
            config,
        })
    }

    /// Brings the title, icon and window up to date with the wall clock.
    fn redraw(&mut self, exposed: bool) -> anyhow::Result<()> {
        let now = chrono::Local::now();
        let redraw = self.state.tick(&now, exposed);

        if redraw.title {
            self.display.set_title(&self.title.format(&now))?;
        }

        if redraw.icon {
            self.display.compose_icon(now.day())?;
        }

        if redraw.window {
            tracing::debug!("updating window");
            self.display.draw_window()?;
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> anyhow::Result<Flow> {
        match classify(&event, self.display.close_request())? {
            Action::Repaint => self.redraw(true)?,
            Action::Close => {
                tracing::info!("window closed by window manager");
                return Ok(Flow::Exit);
            }
            Action::Ignore => {}
        }
        Ok(Flow::Continue)
    }

    /// Drains events the connection has already buffered.
    fn dispatch_pending(&mut self) -> anyhow::Result<Flow> {
        while let Some(event) = self.display.poll_for_event()? {
            if self.handle_event(event)? == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        self.redraw(true)?;
        self.display.map()?;
        self.display.flush()?;

        let socket = AsyncFd::with_interest(
            XSocket(self.display.connection_fd()),
            Interest::READABLE,
        )?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut hangup = signal(SignalKind::hangup())?;
        let interval = self.config.poll_interval();

        loop {
            if self.dispatch_pending()? == Flow::Exit {
                break;
            }
            self.display.flush()?;

            tokio::select! {
                _ = terminate.recv() => break,
                _ = interrupt.recv() => break,
                _ = hangup.recv() => break,
                ready = socket.readable() => {
                    ready?.clear_ready();
                }
                _ = time::sleep(interval) => {
                    if self.dispatch_pending()? == Flow::Exit {
                        break;
                    }
                    self.redraw(false)?;
                }
            }
        }

        tracing::info!("shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::ErrorKind;
    use x11rb::protocol::xproto::{ClientMessageEvent, ExposeEvent, MapNotifyEvent};
    use x11rb::x11_utils::X11Error;

    const WINDOW: u32 = 0x60_0001;

    const CLOSE: CloseRequest = CloseRequest {
        window: WINDOW,
        protocols: 320,
        delete_window: 321,
    };

    fn expose(count: u16) -> Event {
        Event::Expose(ExposeEvent {
            response_type: 12,
            sequence: 7,
            window: WINDOW,
            x: 0,
            y: 0,
            width: 200,
            height: 100,
            count,
        })
    }

    #[test]
    fn only_the_last_expose_repaints() {
        assert_eq!(classify(&expose(2), CLOSE).unwrap(), Action::Ignore);
        assert_eq!(classify(&expose(1), CLOSE).unwrap(), Action::Ignore);
        assert_eq!(classify(&expose(0), CLOSE).unwrap(), Action::Repaint);
    }

    #[test]
    fn delete_window_closes() {
        let delete = ClientMessageEvent::new(32, WINDOW, 320u32, [321, 0, 0, 0, 0]);
        assert_eq!(
            classify(&Event::ClientMessage(delete), CLOSE).unwrap(),
            Action::Close
        );

        let other = ClientMessageEvent::new(32, WINDOW, 320u32, [999, 0, 0, 0, 0]);
        assert_eq!(
            classify(&Event::ClientMessage(other), CLOSE).unwrap(),
            Action::Ignore
        );
    }

    #[test]
    fn protocol_errors_are_fatal() {
        let error = Event::Error(X11Error {
            error_kind: ErrorKind::Value,
            error_code: 2,
            sequence: 9,
            bad_value: 0,
            minor_opcode: 0,
            major_opcode: 1,
            extension_name: None,
            request_name: Some("CreateWindow"),
        });
        let err = classify(&error, CLOSE).unwrap_err();
        assert!(err.to_string().contains("X11 request failed"));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let map = Event::MapNotify(MapNotifyEvent {
            response_type: 19,
            sequence: 3,
            event: WINDOW,
            window: WINDOW,
            override_redirect: false,
        });
        assert_eq!(classify(&map, CLOSE).unwrap(), Action::Ignore);
    }
}
