// SPDX-License-Identifier: GPL-3.0-only

mod applet;
mod assets;
mod clock;
mod config;
mod display;
mod icon;

use applet::Applet;
use config::CalendarIconConfig;

pub fn run(display: Option<&str>) -> anyhow::Result<()> {
    let config = CalendarIconConfig::load();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let applet = Applet::new(display, config)?;
        applet.run().await
    })
}
