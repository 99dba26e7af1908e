//! Connection banner and terminal QR code.

use std::net::Ipv4Addr;

use qrcode::QrCode;
use qrcode::render::unicode::Dense1x2;

use crate::error::AnnounceError;

const RULE_WIDTH: usize = 50;

/// URL other devices on the network use to reach the server.
pub fn connection_url(addr: Ipv4Addr, port: u16) -> String {
    format!("http://{}:{}", addr, port)
}

/// Encode `url` as a QR code drawn with half-block characters.
///
/// The symbol version is picked to fit the data. Colours are inverted so the
/// code scans off a dark terminal background.
pub fn render_qr(url: &str) -> Result<String, AnnounceError> {
    let code = QrCode::new(url.as_bytes()).map_err(|source| AnnounceError::Encode {
        url: url.to_string(),
        source,
    })?;

    Ok(code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

/// Full text printed at startup.
pub fn banner(title: &str, addr: Ipv4Addr, port: u16) -> Result<String, AnnounceError> {
    let url = connection_url(addr, port);
    let qr = render_qr(&url)?;
    let rule = "=".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push('\n');
    out.push_str(&rule);
    out.push_str(&format!("\n {}\n", title));
    out.push_str(&rule);
    out.push_str(&format!("\n\n PC (Local):   http://localhost:{}\n", port));
    out.push_str(&format!(" Smartphone:   {}\n\n", url));
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&qr);
    out.push_str("\n\nPress Ctrl+C to stop the server.");
    Ok(out)
}

/// Print the banner to stdout.
pub fn announce(title: &str, addr: Ipv4Addr, port: u16) -> Result<(), AnnounceError> {
    println!("{}", banner(title, addr, port)?);
    Ok(())
}
