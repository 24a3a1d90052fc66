use crate::region::CaptureRegion;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
	#[error("window {0:?} not found")]
	WindowNotFound(String),
	#[error("capture region {width}x{height} is empty")]
	EmptyRegion { width: i32, height: i32 },
	#[error("capture region lies outside the monitor")]
	OutOfBounds,
	#[error(transparent)]
	Backend(#[from] xcap::XCapError),
}

/// Anything that can grab the pixels under a capture region.
pub trait FrameSource: Send {
	fn capture(&mut self, region: &CaptureRegion, window_title: Option<&str>) -> Result<ie::Capture, CaptureError>;
}

pub fn find_window(title: &str) -> Option<xcap::Window> {
	let windows = xcap::Window::all().ok()?;
	windows.into_iter().find(|window| {
		window.title().ok().as_deref() == Some(title) || window.app_name().ok().as_deref() == Some(title)
	})
}

/// Screen capture through xcap.
///
/// The target window only has to exist; pixels come from the monitor under
/// the region's top-left corner so overlays drawn over the game are included.
#[derive(Debug, Default)]
pub struct XcapSource;

impl FrameSource for XcapSource {
	fn capture(&mut self, region: &CaptureRegion, window_title: Option<&str>) -> Result<ie::Capture, CaptureError> {
		if region.is_empty() {
			return Err(CaptureError::EmptyRegion {
				width: region.width,
				height: region.height,
			});
		}
		if let Some(title) = window_title {
			find_window(title).ok_or_else(|| CaptureError::WindowNotFound(title.to_string()))?;
		}

		let monitor = xcap::Monitor::from_point(region.left, region.top)?;
		let (x, y) = (region.left - monitor.x()?, region.top - monitor.y()?);
		let image = monitor.capture_image()?;

		let (x, y) = (x.max(0) as u32, y.max(0) as u32);
		if x >= image.width() || y >= image.height() {
			return Err(CaptureError::OutOfBounds);
		}
		let width = (region.width as u32).min(image.width() - x);
		let height = (region.height as u32).min(image.height() - y);

		let cropped = xcap::image::imageops::crop_imm(&image, x, y, width, height).to_image();
		Ok(ie::Capture::from_rgba(cropped.width(), cropped.as_raw()))
	}
}
