// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Desktop windows through `winit`.

use lumen_core::platform::{LumenWindowHandle, RenderWindow};
use lumen_core::renderer::api::Extent2D;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::sync::Arc;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::error::OsError;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

/// A `winit` window shared between the event loop and the renderer.
///
/// Clones refer to the same window. The renderer only ever queries it, so
/// it can sit on the render thread while the event loop keeps its own clone.
#[derive(Debug, Clone)]
pub struct WinitWindow {
    inner: Arc<Window>,
}

impl WinitWindow {
    /// Adopts a window the application created itself.
    pub fn from_window(window: Arc<Window>) -> Self {
        Self { inner: window }
    }

    /// Handle for [`WgpuDeviceSelector::new`](crate::WgpuDeviceSelector::new).
    pub fn handle(&self) -> LumenWindowHandle {
        self.inner.clone()
    }

    /// The wrapped window, for event-loop side calls.
    pub fn window(&self) -> &Window {
        &self.inner
    }
}

/// Window options applied by [`WinitWindowBuilder::build`].
pub struct WinitWindowBuilder {
    attributes: WindowAttributes,
}

impl WinitWindowBuilder {
    /// A visible, resizable 1024x768 window titled "Lumen".
    pub fn new() -> Self {
        Self {
            attributes: Window::default_attributes()
                .with_title("Lumen")
                .with_inner_size(LogicalSize::new(1024u32, 768u32))
                .with_visible(true),
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.attributes = self.attributes.with_title(title);
        self
    }

    /// Sets the initial inner size in logical pixels.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.attributes = self
            .attributes
            .with_inner_size(LogicalSize::new(width, height));
        self
    }

    /// Keeps the window from shrinking below `width` x `height` logical
    /// pixels. Minimizing still yields an empty framebuffer.
    pub fn with_min_dimensions(mut self, width: u32, height: u32) -> Self {
        self.attributes = self
            .attributes
            .with_min_inner_size(LogicalSize::new(width, height));
        self
    }

    /// Creates the window.
    ///
    /// ## Errors
    /// Whatever `winit` reports when the platform refuses the window.
    pub fn build(self, event_loop: &ActiveEventLoop) -> Result<WinitWindow, OsError> {
        let window = event_loop.create_window(self.attributes)?;
        let PhysicalSize { width, height } = window.inner_size();
        log::info!(
            "WinitWindow: '{}' created ({:?}, {width}x{height} physical).",
            window.title(),
            window.id()
        );
        Ok(WinitWindow::from_window(Arc::new(window)))
    }
}

impl Default for WinitWindowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HasWindowHandle for WinitWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.inner.window_handle()
    }
}

impl HasDisplayHandle for WinitWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.inner.display_handle()
    }
}

impl RenderWindow for WinitWindow {
    fn framebuffer_extent(&self) -> Extent2D {
        let PhysicalSize { width, height } = self.inner.inner_size();
        Extent2D::new(width, height)
    }

    fn scale_factor(&self) -> f64 {
        self.inner.scale_factor()
    }

    fn request_redraw(&self) {
        self.inner.request_redraw();
    }

    fn id(&self) -> u64 {
        u64::from(self.inner.id())
    }
}
