//! Immediate-mode render context: a [`CallStream`] over wgpu.
//!
//! Every indexed draw is recorded into its own render pass and submitted at
//! once, so queue order equals call order. A blit submitted when the capture
//! system sees a pass end therefore runs after every draw of that pass.

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use passtap_core::{CallStream, DrawIndexed, IntrospectError, ShaderStage, StageKind};
use wgpu::util::DeviceExt;

use crate::backend::RenderTarget;
use crate::context::{GpuContext, GpuError};

/// A linked render pipeline plus the WGSL it was built from.
#[derive(Debug)]
pub struct Program {
    pipeline: wgpu::RenderPipeline,
    format: wgpu::TextureFormat,
    stages: Vec<ShaderStage>,
}

impl Program {
    pub fn stages(&self) -> &[ShaderStage] {
        &self.stages
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

/// Host-facing draw context. Program binds and indexed draws go through
/// [`CallStream`]; targets and index buffers are bound directly.
pub struct ImmediateContext {
    context: GpuContext,
    program: Option<Arc<Program>>,
    target: Option<Weak<RenderTarget>>,
    index_buffer: Option<wgpu::Buffer>,
}

impl ImmediateContext {
    pub fn new(context: GpuContext) -> Self {
        Self {
            context,
            program: None,
            target: None,
            index_buffer: None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Build a program from a vertex and a fragment WGSL module. Entry points
    /// are `vs_main` and `fs_main`; vertices come from `@builtin(vertex_index)`.
    pub fn create_program(
        &self,
        label: &str,
        vertex_wgsl: &str,
        fragment_wgsl: &str,
        format: wgpu::TextureFormat,
    ) -> Arc<Program> {
        let device = &self.context.device;
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(vertex_wgsl)),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(fragment_wgsl)),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: None,
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        Arc::new(Program {
            pipeline,
            format,
            stages: vec![
                ShaderStage::new(StageKind::Vertex, vertex_wgsl),
                ShaderStage::new(StageKind::Fragment, fragment_wgsl),
            ],
        })
    }

    /// Upload a `u32` index buffer.
    pub fn create_index_buffer(&self, indices: &[u32]) -> wgpu::Buffer {
        let contents: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        self.context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("passtap_index_buffer"),
                contents: &contents,
                usage: wgpu::BufferUsages::INDEX,
            })
    }

    pub fn bind_index_buffer(&mut self, buffer: wgpu::Buffer) {
        self.index_buffer = Some(buffer);
    }

    /// Bind the colour target for subsequent draws. Only a weak reference is
    /// kept.
    pub fn bind_target(&mut self, target: Option<&Arc<RenderTarget>>) {
        self.target = target.map(Arc::downgrade);
    }

    /// Clear `target` to `color`, submitted immediately.
    pub fn clear_target(&self, target: &RenderTarget, color: wgpu::Color) {
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("passtap_clear_encoder"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("passtap_clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        self.context.queue.submit(std::iter::once(encoder.finish()));
    }

    fn submit_draw(&self, call: &DrawIndexed) -> Result<(), GpuError> {
        let program = self.program.as_ref().ok_or(GpuError::NoProgram)?;
        let target = self
            .target
            .as_ref()
            .ok_or(GpuError::NoTarget)?
            .upgrade()
            .ok_or(GpuError::TargetReleased)?;
        let index_buffer = self.index_buffer.as_ref().ok_or(GpuError::NoIndexBuffer)?;
        if program.format != target.texture.format() {
            return Err(GpuError::AttachmentFormat {
                program: program.format,
                target: target.texture.format(),
            });
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("passtap_draw_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("passtap_draw"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(call.indices.clone(), call.base_vertex, call.instances.clone());
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl CallStream for ImmediateContext {
    type Program = Arc<Program>;
    type Target = Weak<RenderTarget>;
    type Output = Result<(), GpuError>;

    fn bind_program(&mut self, program: Option<Arc<Program>>) -> Self::Output {
        self.program = program;
        Ok(())
    }

    fn draw_indexed(&mut self, call: DrawIndexed) -> Self::Output {
        let result = self.submit_draw(&call);
        if let Err(err) = &result {
            tracing::warn!(%err, "indexed draw dropped");
        }
        result
    }

    fn bound_target(&self) -> Option<Weak<RenderTarget>> {
        self.target.clone()
    }

    fn attached_shaders(&self, program: &Arc<Program>) -> Result<Vec<ShaderStage>, IntrospectError> {
        if program.stages.is_empty() {
            return Err(IntrospectError::NoAttachedShaders);
        }
        Ok(program.stages.clone())
    }
}
