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

//! The closed vocabulary shared between the command core and backend modules.
//!
//! Backend crates define the concrete payload types; this module only fixes
//! the type tags and the three execution priority levels.

/// Execution priority of a recorded command.
///
/// Commands are executed in priority order High -> Normal -> Low, regardless
/// of the order in which they were recorded. Within one priority level,
/// execution order equals recording order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CommandPriority {
    /// State changes and clears that must run before anything else.
    High = 0,
    /// Drawing, binding and transformation commands.
    Normal = 1,
    /// Effects and debug overlays that run last.
    Low = 2,
}

impl CommandPriority {
    /// Number of priority levels.
    pub const COUNT: usize = 3;

    /// All priority levels, in execution order.
    pub const ALL: [CommandPriority; Self::COUNT] = [
        CommandPriority::High,
        CommandPriority::Normal,
        CommandPriority::Low,
    ];
}

/// Identifies the kind of a recorded command.
///
/// This enum is the shared vocabulary between the command core and the
/// backend modules that define concrete payload types (e.g. an OpenGL or
/// Vulkan backend). The core attaches no semantics to any entry; it only
/// stores the tag in the command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandType {
    // State setting
    /// Set viewport dimensions.
    SetViewport = 0,
    /// Set the clear color for the framebuffer.
    SetClearColor,
    /// Set the depth range used for depth testing.
    SetDepthRange,
    /// Set the blending mode for transparency.
    SetBlendMode,
    /// Set the face culling mode.
    SetCullMode,
    /// Enable or disable depth testing.
    SetDepthTest,
    /// Set the scissor rectangle.
    SetScissor,

    // Buffer operations
    /// Clear a combination of buffers.
    ClearBuffers,
    /// Clear the color buffer only.
    ClearColorBuffer,
    /// Clear the depth buffer only.
    ClearDepthBuffer,
    /// Clear the stencil buffer only.
    ClearStencilBuffer,

    // Resource binding
    /// Bind a shader program.
    BindShader,
    /// Bind a texture to a texture unit.
    BindTexture,
    /// Bind a vertex buffer.
    BindVertexBuffer,
    /// Bind an index buffer.
    BindIndexBuffer,
    /// Bind a uniform buffer.
    BindUniformBuffer,
    /// Bind a framebuffer.
    BindFramebuffer,

    // Drawing
    /// Draw using vertex arrays.
    DrawArrays,
    /// Draw using indexed vertices.
    DrawElements,
    /// Instanced draw using vertex arrays.
    DrawArraysInstanced,
    /// Instanced draw using indexed vertices.
    DrawElementsInstanced,

    // Transformations
    /// Set the model transformation matrix.
    SetModelMatrix,
    /// Set the view transformation matrix.
    SetViewMatrix,
    /// Set the projection matrix.
    SetProjectionMatrix,
    /// Set the normal transformation matrix.
    SetNormalMatrix,

    // Material
    /// Set diffuse material properties.
    SetMaterialDiffuse,
    /// Set specular material properties.
    SetMaterialSpecular,
    /// Set ambient material properties.
    SetMaterialAmbient,
    /// Set material shininess.
    SetMaterialShininess,

    // Lighting
    /// Set a light's position.
    SetLightPosition,
    /// Set a light's color.
    SetLightColor,
    /// Set a light's attenuation parameters.
    SetLightAttenuation,
    /// Set a light's direction.
    SetLightDirection,

    // Effects
    /// Begin a post-processing pass.
    BeginPostProcessing,
    /// End a post-processing pass.
    EndPostProcessing,
    /// Apply a bloom effect.
    ApplyBloom,
    /// Apply tone mapping.
    ApplyToneMapping,

    // Debug
    /// Draw a wireframe overlay.
    DrawWireframe,
    /// Draw bounding boxes.
    DrawBoundingBox,
    /// Draw surface normals.
    DrawNormals,
    /// Draw debug text.
    DrawDebugText,

    // Synchronization
    /// Flush the command queue.
    FlushCommands,
    /// Finish all pending commands.
    FinishCommands,
    /// Insert a synchronization fence.
    InsertFence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_execution_order() {
        assert_eq!(
            CommandPriority::ALL,
            [
                CommandPriority::High,
                CommandPriority::Normal,
                CommandPriority::Low
            ]
        );
        assert!(CommandPriority::High < CommandPriority::Normal);
        assert!(CommandPriority::Normal < CommandPriority::Low);
    }

    #[test]
    fn priority_discriminants_are_dense() {
        for (index, priority) in CommandPriority::ALL.into_iter().enumerate() {
            assert_eq!(priority as usize, index);
        }
    }

    #[test]
    fn command_type_fits_header_tag() {
        // The header stores the tag as u16.
        assert_eq!(std::mem::size_of::<CommandType>(), 2);
        assert_eq!(CommandType::SetViewport as u16, 0);
    }
}
