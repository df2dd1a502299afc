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

//! # Lumen Render
//!
//! The rendering core of Lumen. A [`Renderer`] owns the device, the
//! [`SwapChain`], the resource caches and the render targets, and turns a
//! [`Scene`] into one presented frame per call. Drawable objects are
//! [`RenderableInstance`]s: a shared renderable plus either one transform
//! ([`UniqueInstance`]) or a batch of them drawn with instancing
//! ([`MultipleInstance`]).
//!
//! Device access goes through the `lumen_core::renderer::GraphicsDevice`
//! contract; the wgpu implementation lives in `lumen-infra`.

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod instance;
pub mod logging;
pub mod program;
pub mod render_target;
pub mod renderer;
pub mod scene;
pub mod services;
pub mod statistics;
pub mod swap_chain;

pub use self::config::{Config, ConfigError, EngineConfig, RendererConfig};
pub use self::engine::{Engine, EngineReport};
pub use self::instance::{
    Drawable, InstanceFlags, MultipleInstance, Readiness, RenderableInstance, UniqueInstance,
};
pub use self::logging::{init_logging, LoggingConfig};
pub use self::program::{PassKind, ProgramGenerator};
pub use self::render_target::{RenderTarget, RenderTargetDescriptor, RenderTargetId, RenderTargetKind};
pub use self::renderer::{FrameOutcome, Renderer, RendererError, RendererEvent};
pub use self::scene::{ActiveScene, InstanceScene, Overlay, Scene, ShutdownSignal};
pub use self::swap_chain::{SwapChain, SwapChainStatus};
