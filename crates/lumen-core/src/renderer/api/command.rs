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

//! Command pools, command buffers and queue submission.

use super::swap_chain::SwapChainId;
use std::borrow::Cow;

/// An opaque handle to a command pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandPoolId(pub usize);

/// An opaque handle to a command buffer allocated from a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandBufferId(pub u64);

/// Identifies one queue submission, used to wait for its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

/// Describes a command pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPoolDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Buffers are short-lived and re-recorded often.
    pub transient: bool,
    /// Buffers may be reset individually.
    pub resettable: bool,
}

/// How a command buffer is going to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferUsage {
    /// Recorded, submitted once, then reset.
    OneTimeSubmit,
    /// May be submitted several times.
    Reusable,
}

/// Describes one queue submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Finished command buffer.
    pub command_buffer: CommandBufferId,
    /// Swap-chain image the commands render into; the submission waits for
    /// that image to become available.
    pub wait_image: Option<(SwapChainId, u32)>,
}
