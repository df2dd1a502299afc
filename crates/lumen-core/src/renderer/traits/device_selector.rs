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

use crate::renderer::api::DeviceRequest;
use crate::renderer::error::RenderError;
use crate::renderer::traits::GraphicsDevice;
use async_trait::async_trait;
use std::sync::Arc;

/// The platform collaborator that turns a [`DeviceRequest`] into a device.
///
/// Implementations enumerate the available adapters, pick the most suitable one
/// and open a logical device on it, bound to the window surface when
/// presentation is required.
#[async_trait]
pub trait DeviceSelector: Send + Sync {
    /// Selects an adapter and opens a logical device on it.
    ///
    /// ## Errors
    /// [`RenderError::NoSuitableDevice`] when no adapter satisfies the request.
    async fn select_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<Arc<dyn GraphicsDevice>, RenderError>;
}
