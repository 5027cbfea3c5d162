use std::io::Cursor;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, QrCode};

use pledge_types::api::QrPayload;

/// Quiet zone around the symbol, in modules.
const MARGIN: usize = 1;
/// Minimum rendered width in pixels.
const MIN_WIDTH: usize = 300;

/// Render the payload as JSON inside a black-on-white PNG QR code and
/// return it as a `data:` URL.
pub fn render_data_url(payload: &QrPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    let png = render_png(json.as_bytes())?;
    Ok(format!("data:image/png;base64,{}", B64.encode(png)))
}

fn render_png(data: &[u8]) -> Result<Vec<u8>> {
    let code = QrCode::new(data)?;
    let modules = code.width();
    let colors = code.to_colors();

    let span = modules + 2 * MARGIN;
    let scale = MIN_WIDTH.div_ceil(span).max(1);
    let size = (span * scale) as u32;

    let img = GrayImage::from_fn(size, size, |x, y| {
        let mx = (x as usize / scale).checked_sub(MARGIN).filter(|&m| m < modules);
        let my = (y as usize / scale).checked_sub(MARGIN).filter(|&m| m < modules);
        let dark = match (mx, my) {
            (Some(mx), Some(my)) => colors[my * modules + mx] == Color::Dark,
            _ => false,
        };
        Luma([if dark { 0 } else { 255 }])
    });

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
