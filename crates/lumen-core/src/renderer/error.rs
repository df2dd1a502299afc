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

//! Errors reported by devices, recorders and swap chains.
//!
//! The hierarchy is layered: [`ShaderError`] and [`PipelineError`] nest into
//! [`ResourceError`], which nests into [`RenderError`] together with
//! [`SurfaceError`]. Each layer converts into the next with `?`.

use crate::renderer::api::{PipelineLayoutId, RenderPassId, ShaderModuleId};
use std::error::Error;
use std::fmt;

/// A shader module was rejected or is unknown.
#[derive(Debug)]
pub enum ShaderError {
    /// The module has no code.
    EmptySource {
        /// Debug label of the module, if any.
        label: Option<String>,
    },
    /// No module has this ID.
    NotFound {
        /// The missing module.
        id: ShaderModuleId,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySource { label } => write!(
                f,
                "shader module '{}' has an empty source",
                label.as_deref().unwrap_or("<unnamed>")
            ),
            Self::NotFound { id } => write!(f, "no shader module {id:?}"),
        }
    }
}

impl Error for ShaderError {}

/// A pipeline or pipeline layout could not be built.
#[derive(Debug)]
pub enum PipelineError {
    /// The layout was refused by the backend.
    LayoutCreationFailed(String),
    /// The pipeline itself was refused by the backend.
    CompilationFailed {
        /// Debug label of the pipeline, if any.
        label: Option<String>,
        /// Backend message.
        details: String,
    },
    /// The pipeline names a render pass that does not exist.
    InvalidRenderPass {
        /// The missing pass.
        id: RenderPassId,
    },
    /// The pipeline names a layout that does not exist.
    InvalidLayout {
        /// The missing layout.
        id: PipelineLayoutId,
    },
    /// The color target does not match the render pass attachment.
    IncompatibleColorTarget(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LayoutCreationFailed(msg) => write!(f, "pipeline layout rejected: {msg}"),
            Self::CompilationFailed { label, details } => write!(
                f,
                "pipeline '{}' rejected: {details}",
                label.as_deref().unwrap_or("<unnamed>")
            ),
            Self::InvalidRenderPass { id } => write!(f, "no render pass {id:?}"),
            Self::InvalidLayout { id } => write!(f, "no pipeline layout {id:?}"),
            Self::IncompatibleColorTarget(msg) => write!(f, "color target mismatch: {msg}"),
        }
    }
}

impl Error for PipelineError {}

/// A device object could not be created, found or accessed.
#[derive(Debug)]
pub enum ResourceError {
    /// See [`ShaderError`].
    Shader(ShaderError),
    /// See [`PipelineError`].
    Pipeline(PipelineError),
    /// The ID does not name a live object.
    NotFound,
    /// The ID names an object of the wrong kind or state.
    InvalidHandle,
    /// A write or read falls outside the object.
    OutOfBounds,
    /// A fixed-capacity pool is full.
    Exhausted(String),
    /// Any other backend failure.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shader(err) => write!(f, "shader: {err}"),
            Self::Pipeline(err) => write!(f, "pipeline: {err}"),
            Self::NotFound => f.write_str("no such device object"),
            Self::InvalidHandle => f.write_str("handle does not fit this operation"),
            Self::OutOfBounds => f.write_str("access outside the object"),
            Self::Exhausted(what) => write!(f, "pool full: {what}"),
            Self::BackendError(msg) => write!(f, "backend: {msg}"),
        }
    }
}

impl Error for ResourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shader(err) => Some(err),
            Self::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        Self::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

/// Why an image could not be acquired or presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The chain no longer matches the surface.
    OutOfDate,
    /// No image was released in time.
    Timeout,
    /// The surface is gone.
    Lost,
    /// Out of device memory.
    OutOfMemory,
    /// The chain is waiting to be recreated; nothing may be acquired.
    Degraded,
    /// Any other backend failure.
    Other(String),
}

impl SurfaceError {
    /// Whether recreating the swap chain is the expected remedy.
    pub fn requires_recreation(&self) -> bool {
        matches!(self, Self::OutOfDate | Self::Lost | Self::Degraded)
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfDate => f.write_str("swap chain out of date"),
            Self::Timeout => f.write_str("timed out acquiring an image"),
            Self::Lost => f.write_str("surface lost"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::Degraded => f.write_str("swap chain awaiting recreation"),
            Self::Other(msg) => write!(f, "surface: {msg}"),
        }
    }
}

impl Error for SurfaceError {}

/// Top-level device failure.
#[derive(Debug)]
pub enum RenderError {
    /// The device or recorder was used before it was ready.
    NotInitialized,
    /// The backend could not be brought up.
    InitializationFailed(String),
    /// No adapter satisfied the [`DeviceRequest`](crate::renderer::api::DeviceRequest).
    NoSuitableDevice(String),
    /// See [`SurfaceError`].
    Surface(SurfaceError),
    /// Recording or submission failed.
    RenderingFailed(String),
    /// See [`ResourceError`].
    ResourceError(ResourceError),
    /// A broken internal assumption.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("device not initialized"),
            Self::InitializationFailed(msg) => write!(f, "backend initialization: {msg}"),
            Self::NoSuitableDevice(msg) => write!(f, "no suitable device: {msg}"),
            Self::Surface(err) => write!(f, "surface: {err}"),
            Self::RenderingFailed(msg) => write!(f, "rendering: {msg}"),
            Self::ResourceError(err) => write!(f, "resource: {err}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ResourceError(err) => Some(err),
            Self::Surface(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        Self::ResourceError(err)
    }
}

impl From<SurfaceError> for RenderError {
    fn from(err: SurfaceError) -> Self {
        Self::Surface(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_shader_message_names_the_module() {
        let err = ShaderError::EmptySource {
            label: Some("instance.vs".to_string()),
        };
        assert_eq!(err.to_string(), "shader module 'instance.vs' has an empty source");
        let unnamed = ShaderError::EmptySource { label: None };
        assert!(unnamed.to_string().contains("<unnamed>"));
    }

    #[test]
    fn test_errors_nest_with_sources() {
        let err: RenderError = ResourceError::from(PipelineError::InvalidRenderPass {
            id: RenderPassId(7),
        })
        .into();
        assert_eq!(
            err.to_string(),
            "resource: pipeline: no render pass RenderPassId(7)"
        );
        let pipeline = err.source().and_then(|e| e.source());
        assert!(pipeline.is_some_and(|e| e.is::<PipelineError>()));
    }

    #[test]
    fn test_surface_errors_that_call_for_recreation() {
        assert!(SurfaceError::OutOfDate.requires_recreation());
        assert!(SurfaceError::Lost.requires_recreation());
        assert!(SurfaceError::Degraded.requires_recreation());
        assert!(!SurfaceError::Timeout.requires_recreation());
        assert!(!SurfaceError::Other("x".into()).requires_recreation());
    }
}
