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

//! Backend-agnostic descriptors and handles of the rendering API.
//!
//! Every GPU object is referenced through a small `Copy` ID newtype. The
//! objects themselves live inside a [`GraphicsDevice`] implementation, which
//! translates the descriptors defined here into calls to a concrete graphics
//! API.
//!
//! [`GraphicsDevice`]: crate::renderer::traits::GraphicsDevice

pub mod adapter;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod pass;
pub mod pipeline;
pub mod shader;
pub mod swap_chain;
pub mod texture;

pub use self::adapter::*;
pub use self::buffer::*;
pub use self::command::*;
pub use self::descriptor::*;
pub use self::pass::*;
pub use self::pipeline::*;
pub use self::shader::*;
pub use self::swap_chain::*;
pub use self::texture::*;
