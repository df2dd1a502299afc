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

//! Shader modules and stage visibility flags.

use std::borrow::Cow;
use std::ops::BitOr;

/// An opaque handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleId(pub usize);

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// Set of shader stages that can see a binding or a push constant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStageFlags {
    bits: u32,
}

impl ShaderStageFlags {
    /// No stage.
    pub const NONE: Self = Self { bits: 0 };
    /// Vertex stage.
    pub const VERTEX: Self = Self { bits: 1 << 0 };
    /// Fragment stage.
    pub const FRAGMENT: Self = Self { bits: 1 << 1 };
    /// Vertex and fragment stages.
    pub const VERTEX_FRAGMENT: Self = Self {
        bits: Self::VERTEX.bits | Self::FRAGMENT.bits,
    };

    /// Raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Whether `stage` is part of the set.
    pub const fn contains(&self, stage: ShaderStage) -> bool {
        let bit = match stage {
            ShaderStage::Vertex => Self::VERTEX.bits,
            ShaderStage::Fragment => Self::FRAGMENT.bits,
        };
        self.bits & bit == bit
    }

    /// Whether no stage is set.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl BitOr for ShaderStageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Shader source handed to the device for compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderSource {
    /// WGSL text.
    Wgsl(Cow<'static, str>),
}

impl ShaderSource {
    /// Source text, whatever the language.
    pub fn text(&self) -> &str {
        match self {
            ShaderSource::Wgsl(text) => text,
        }
    }
}

/// Describes a shader module to compile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderModuleDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Source code.
    pub source: ShaderSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_flags_contain_their_stages() {
        let flags = ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        assert_eq!(flags, ShaderStageFlags::VERTEX_FRAGMENT);
        assert!(flags.contains(ShaderStage::Vertex));
        assert!(flags.contains(ShaderStage::Fragment));
        assert!(!ShaderStageFlags::VERTEX.contains(ShaderStage::Fragment));
        assert!(ShaderStageFlags::NONE.is_empty());
    }
}
