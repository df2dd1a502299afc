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

use crate::renderer::api::Extent2D;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// The raw-handle pair a graphics backend needs to create a surface.
pub trait WindowHandle: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle> WindowHandle for T {}

/// A thread-safe, shareable raw window handle.
pub type LumenWindowHandle = Arc<dyn WindowHandle + Send + Sync>;

/// The window the renderer presents into.
///
/// Only the queries the renderer needs are exposed, so headless hosts and
/// tests can implement it without a windowing system.
pub trait RenderWindow: Send + Sync {
    /// The current framebuffer size in physical pixels.
    ///
    /// A zero width or height means the window is minimized.
    fn framebuffer_extent(&self) -> Extent2D;

    /// The scale factor between logical and physical pixels.
    fn scale_factor(&self) -> f64 {
        1.0
    }

    /// Requests that the window be redrawn.
    fn request_redraw(&self) {}

    /// Returns the unique identifier for the window.
    fn id(&self) -> u64;
}
